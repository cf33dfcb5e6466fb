//! Overseerr and Jellyseerr share one API surface.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{enrich_each, settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Status {
    pub version: Option<String>,
    pub commit_tag: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub update_available: bool,
    #[serde(deserialize_with = "null_default")]
    pub restart_required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCounts {
    #[serde(deserialize_with = "null_default")]
    pub total: i64,
    #[serde(deserialize_with = "null_default")]
    pub movie: i64,
    #[serde(deserialize_with = "null_default")]
    pub tv: i64,
    #[serde(deserialize_with = "null_default")]
    pub pending: i64,
    #[serde(deserialize_with = "null_default")]
    pub approved: i64,
    #[serde(deserialize_with = "null_default")]
    pub declined: i64,
    #[serde(deserialize_with = "null_default")]
    pub processing: i64,
    #[serde(deserialize_with = "null_default")]
    pub available: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueCounts {
    #[serde(deserialize_with = "null_default")]
    pub total: i64,
    #[serde(deserialize_with = "null_default")]
    pub open: i64,
    #[serde(deserialize_with = "null_default")]
    pub closed: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RequestPage {
    #[serde(deserialize_with = "null_default")]
    results: Vec<MediaRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaRequest {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_default")]
    pub status: i64,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub created_at: Option<String>,
    pub media: Option<RequestedMedia>,
    pub requested_by: Option<Requester>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestedMedia {
    pub tmdb_id: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub status: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Requester {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

/// Movie details carry `title`, tv details carry `name`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MediaDetails {
    title: Option<String>,
    name: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeerrStats {
    pub total_requests: i64,
    pub movie_requests: i64,
    pub tv_requests: i64,
    pub pending_requests: i64,
    pub approved_requests: i64,
    pub declined_requests: i64,
    pub processing_requests: i64,
    pub available_requests: i64,
    pub open_issues: i64,
}

impl SeerrStats {
    pub fn derive(requests: &RequestCounts, issues: &IssueCounts) -> Self {
        Self {
            total_requests: requests.total,
            movie_requests: requests.movie,
            tv_requests: requests.tv,
            pending_requests: requests.pending,
            approved_requests: requests.approved,
            declined_requests: requests.declined,
            processing_requests: requests.processing,
            available_requests: requests.available,
            open_issues: issues.open,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeerrOverview {
    pub status: Option<Status>,
    pub stats: SeerrStats,
    pub recent_requests: Vec<MediaRequest>,
}

pub struct SeerrClient<'a> {
    http: &'a Upstream,
    base: String,
    api_key: &'a str,
}

impl<'a> SeerrClient<'a> {
    pub fn new(http: &'a Upstream, profile: &'a Profile) -> Result<Self, ServiceError> {
        let api_key = profile
            .api_key()
            .ok_or(ServiceError::MissingCredentials("apiKey"))?;
        Ok(Self {
            http,
            base: format!("{}/api/v1", profile.url),
            api_key,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        self.http
            .get_json(
                UpstreamRequest::get(format!("{}/{path}", self.base))
                    .header("X-Api-Key", self.api_key),
            )
            .await
    }

    async fn details(&self, media_type: &str, tmdb_id: i64) -> Result<MediaDetails, UpstreamError> {
        self.get(&format!("{media_type}/{tmdb_id}")).await
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<SeerrOverview, ServiceError> {
    let client = SeerrClient::new(upstream, profile)?;

    let (status, counts, recent, issues) = tokio::join!(
        client.get::<Status>("status"),
        client.get::<RequestCounts>("request/count"),
        client.get::<RequestPage>("request?take=10&skip=0&sort=added"),
        client.get::<IssueCounts>("issue/count"),
    );

    let status = settled(instance, "status", status);
    let counts = settled_or_default(instance, "request/count", counts);
    let recent = settled_or_default(instance, "request", recent).results;
    let issues = settled_or_default(instance, "issue/count", issues);

    let client = &client;
    let recent_requests = enrich_each(
        instance,
        recent,
        |req: &MediaRequest| {
            let tmdb_id = req.media.as_ref()?.tmdb_id?;
            let media_type = match req.media_type.as_deref()? {
                "movie" => "movie",
                "tv" => "tv",
                _ => return None,
            };
            Some(async move { client.details(media_type, tmdb_id).await })
        },
        |mut req, details| {
            req.title = details.title.or(details.name);
            req.poster_path = details.poster_path;
            req
        },
    )
    .await;

    Ok(SeerrOverview {
        status,
        stats: SeerrStats::derive(&counts, &issues),
        recent_requests,
    })
}
