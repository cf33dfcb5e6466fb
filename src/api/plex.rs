use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{enrich_each, settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

/// Every Plex JSON response is wrapped in a `MediaContainer`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerIdentity {
    pub friendly_name: Option<String>,
    pub machine_identifier: Option<String>,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub my_plex_username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SectionList {
    #[serde(rename = "Directory", deserialize_with = "null_default")]
    directory: Vec<Section>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Section {
    key: Option<String>,
    title: Option<String>,
    #[serde(rename = "type")]
    section_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub key: String,
    pub title: String,
    pub library_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SectionTotal {
    #[serde(deserialize_with = "null_default")]
    total_size: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataList<T> {
    #[serde(rename = "Metadata")]
    metadata: Option<Vec<T>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSession {
    title: Option<String>,
    grandparent_title: Option<String>,
    #[serde(rename = "type")]
    media_type: Option<String>,
    #[serde(rename = "User")]
    user: Option<Named>,
    #[serde(rename = "Player")]
    player: Option<RawPlayer>,
    #[serde(rename = "TranscodeSession")]
    transcode: Option<RawTranscode>,
    #[serde(rename = "Session")]
    session: Option<RawSessionInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Named {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlayer {
    state: Option<String>,
    product: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTranscode {
    video_decision: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSessionInfo {
    #[serde(deserialize_with = "null_default")]
    bandwidth: i64,
    location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub title: String,
    pub grandparent_title: Option<String>,
    pub media_type: String,
    pub user: String,
    pub player: Option<String>,
    pub product: Option<String>,
    pub state: Option<String>,
    pub transcoding: bool,
    pub bandwidth: i64,
    pub location: Option<String>,
}

impl From<RawSession> for Session {
    fn from(raw: RawSession) -> Self {
        let transcoding = raw
            .transcode
            .as_ref()
            .map(|t| t.video_decision.as_deref() != Some("directplay"))
            .unwrap_or(false);
        let player = raw.player.unwrap_or_default();
        let info = raw.session.unwrap_or_default();
        Session {
            title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
            grandparent_title: raw.grandparent_title,
            media_type: raw.media_type.unwrap_or_else(|| "unknown".to_string()),
            user: raw
                .user
                .and_then(|u| u.title)
                .unwrap_or_else(|| "Unknown".to_string()),
            player: player.title,
            product: player.product,
            state: player.state,
            transcoding,
            bandwidth: info.bandwidth,
            location: info.location,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentItem {
    pub rating_key: Option<String>,
    pub title: Option<String>,
    #[serde(rename(deserialize = "type"))]
    pub media_type: Option<String>,
    pub year: Option<i64>,
    pub thumb: Option<String>,
    pub grandparent_title: Option<String>,
    pub added_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexStats {
    pub library_count: i64,
    pub total_items: i64,
    pub active_sessions: i64,
    pub transcode_sessions: i64,
    pub direct_play_sessions: i64,
    pub total_bandwidth: i64,
}

impl PlexStats {
    pub fn derive(libraries: &[Library], sessions: &[Session]) -> Self {
        let transcode = sessions.iter().filter(|s| s.transcoding).count() as i64;
        Self {
            library_count: libraries.len() as i64,
            total_items: libraries.iter().filter_map(|l| l.count).sum(),
            active_sessions: sessions.len() as i64,
            transcode_sessions: transcode,
            direct_play_sessions: sessions.len() as i64 - transcode,
            total_bandwidth: sessions.iter().map(|s| s.bandwidth).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexOverview {
    pub server: Option<ServerIdentity>,
    pub stats: PlexStats,
    pub libraries: Vec<Library>,
    pub sessions: Vec<Session>,
    pub recently_added: Vec<RecentItem>,
}

pub struct PlexClient<'a> {
    http: &'a Upstream,
    base: &'a str,
    token: &'a str,
}

impl<'a> PlexClient<'a> {
    pub fn new(http: &'a Upstream, profile: &'a Profile) -> Result<Self, ServiceError> {
        let token = profile
            .token()
            .ok_or(ServiceError::MissingCredentials("token"))?;
        Ok(Self {
            http,
            base: &profile.url,
            token,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        let envelope: Envelope<T> = self
            .http
            .get_json(
                UpstreamRequest::get(format!("{}{}", self.base, path))
                    .header("Accept", "application/json")
                    .header("X-Plex-Token", self.token),
            )
            .await?;
        Ok(envelope.media_container)
    }

    pub async fn identity(&self) -> Result<ServerIdentity, UpstreamError> {
        self.get("/").await
    }

    pub async fn libraries(&self) -> Result<Vec<Library>, UpstreamError> {
        let sections: SectionList = self.get("/library/sections").await?;
        Ok(sections
            .directory
            .into_iter()
            .map(|d| Library {
                key: d.key.unwrap_or_default(),
                title: d.title.unwrap_or_else(|| "Unknown".to_string()),
                library_type: d.section_type.unwrap_or_else(|| "unknown".to_string()),
                count: None,
            })
            .collect())
    }

    pub async fn library_size(&self, key: &str) -> Result<i64, UpstreamError> {
        let total: SectionTotal = self
            .get(&format!(
                "/library/sections/{key}/all?X-Plex-Container-Start=0&X-Plex-Container-Size=0"
            ))
            .await?;
        Ok(total.total_size)
    }

    pub async fn sessions(&self) -> Result<Vec<Session>, UpstreamError> {
        let list: MetadataList<RawSession> = self.get("/status/sessions").await?;
        Ok(list
            .metadata
            .unwrap_or_default()
            .into_iter()
            .map(Session::from)
            .collect())
    }

    pub async fn recently_added(&self, limit: usize) -> Result<Vec<RecentItem>, UpstreamError> {
        let list: MetadataList<RecentItem> = self
            .get(&format!(
                "/library/recentlyAdded?X-Plex-Container-Start=0&X-Plex-Container-Size={limit}"
            ))
            .await?;
        Ok(list.metadata.unwrap_or_default())
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<PlexOverview, ServiceError> {
    let client = PlexClient::new(upstream, profile)?;

    let (identity, libraries, sessions, recent) = tokio::join!(
        client.identity(),
        client.libraries(),
        client.sessions(),
        client.recently_added(20),
    );

    let server = settled(instance, "identity", identity);
    let libraries = settled_or_default(instance, "library/sections", libraries);
    let sessions = settled_or_default(instance, "status/sessions", sessions);
    let recently_added = settled_or_default(instance, "library/recentlyAdded", recent);

    // Section listings carry no item counts; fetch them per library.
    let client = &client;
    let libraries = enrich_each(
        instance,
        libraries,
        |lib: &Library| {
            let key = lib.key.clone();
            (!key.is_empty()).then(|| async move { client.library_size(&key).await })
        },
        |mut lib, count| {
            lib.count = Some(count);
            lib
        },
    )
    .await;

    Ok(PlexOverview {
        server,
        stats: PlexStats::derive(&libraries, &sessions),
        libraries,
        sessions,
        recently_added,
    })
}
