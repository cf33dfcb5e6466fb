use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

/// Most Bazarr endpoints wrap their payload in `{"data": ...}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Data<T> {
    data: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStatus {
    pub bazarr_version: Option<String>,
    pub sonarr_version: Option<String>,
    pub radarr_version: Option<String>,
    pub operating_system: Option<String>,
    pub python_version: Option<String>,
    pub start_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Badges {
    #[serde(deserialize_with = "null_default")]
    pub episodes: i64,
    #[serde(deserialize_with = "null_default")]
    pub movies: i64,
    #[serde(deserialize_with = "null_default")]
    pub providers: i64,
    #[serde(deserialize_with = "null_default")]
    pub status: i64,
    #[serde(deserialize_with = "null_default")]
    pub announcements: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthIssue {
    pub object: Option<String>,
    pub issue: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BazarrStats {
    pub missing_episodes: i64,
    pub missing_movies: i64,
    pub provider_issues: i64,
    pub health_issues: i64,
}

impl BazarrStats {
    pub fn derive(badges: &Badges, health: &[HealthIssue]) -> Self {
        Self {
            missing_episodes: badges.episodes,
            missing_movies: badges.movies,
            provider_issues: badges.providers,
            health_issues: health.len() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BazarrOverview {
    pub system: Option<SystemStatus>,
    pub stats: BazarrStats,
    pub badges: Badges,
    pub health: Vec<HealthIssue>,
}

pub struct BazarrClient<'a> {
    http: &'a Upstream,
    base: &'a str,
    api_key: &'a str,
}

impl<'a> BazarrClient<'a> {
    pub fn new(http: &'a Upstream, profile: &'a Profile) -> Result<Self, ServiceError> {
        let api_key = profile
            .api_key()
            .ok_or(ServiceError::MissingCredentials("apiKey"))?;
        Ok(Self {
            http,
            base: &profile.url,
            api_key,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        self.http
            .get_json(
                UpstreamRequest::get(format!("{}/api/{path}", self.base))
                    .header("X-API-KEY", self.api_key),
            )
            .await
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<BazarrOverview, ServiceError> {
    let client = BazarrClient::new(upstream, profile)?;

    let (status, badges, health) = tokio::join!(
        client.get::<Data<SystemStatus>>("system/status"),
        client.get::<Badges>("badges"),
        client.get::<Data<Vec<HealthIssue>>>("system/health"),
    );

    let system = settled(instance, "system/status", status).map(|d| d.data);
    let badges = settled_or_default(instance, "badges", badges);
    let health = settled_or_default(instance, "system/health", health).data;

    Ok(BazarrOverview {
        system,
        stats: BazarrStats::derive(&badges, &health),
        badges,
        health,
    })
}
