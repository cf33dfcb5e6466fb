use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemInfo {
    pub server_name: Option<String>,
    pub version: Option<String>,
    pub operating_system: Option<String>,
    pub id: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub has_pending_restart: bool,
    #[serde(deserialize_with = "null_default")]
    pub has_update_available: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawSession {
    user_name: Option<String>,
    client: Option<String>,
    device_name: Option<String>,
    now_playing_item: Option<NowPlaying>,
    play_state: Option<PlayState>,
    transcoding_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct NowPlaying {
    name: Option<String>,
    series_name: Option<String>,
    #[serde(rename = "Type")]
    item_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct PlayState {
    #[serde(deserialize_with = "null_default")]
    is_paused: bool,
    play_method: Option<String>,
}

/// A session that is currently playing something. Idle connections are dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<String>,
    pub client: Option<String>,
    pub device: Option<String>,
    pub title: Option<String>,
    pub series_name: Option<String>,
    pub media_type: Option<String>,
    pub paused: bool,
    pub transcoding: bool,
}

impl Session {
    fn from_raw(raw: RawSession) -> Option<Self> {
        let item = raw.now_playing_item?;
        let play_state = raw.play_state.unwrap_or_default();
        let transcoding = raw.transcoding_info.is_some()
            || play_state.play_method.as_deref() == Some("Transcode");
        Some(Session {
            user: raw.user_name,
            client: raw.client,
            device: raw.device_name,
            title: item.name,
            series_name: item.series_name,
            media_type: item.item_type,
            paused: play_state.is_paused,
            transcoding,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ItemCounts {
    #[serde(deserialize_with = "null_default")]
    pub movie_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub series_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub episode_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub album_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub song_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub book_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VirtualFolder {
    pub name: Option<String>,
    pub collection_type: Option<String>,
    pub item_id: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JellyfinStats {
    pub movie_count: i64,
    pub series_count: i64,
    pub episode_count: i64,
    pub library_count: i64,
    pub active_sessions: i64,
    pub transcode_sessions: i64,
}

impl JellyfinStats {
    pub fn derive(counts: &ItemCounts, libraries: &[VirtualFolder], sessions: &[Session]) -> Self {
        Self {
            movie_count: counts.movie_count,
            series_count: counts.series_count,
            episode_count: counts.episode_count,
            library_count: libraries.len() as i64,
            active_sessions: sessions.len() as i64,
            transcode_sessions: sessions.iter().filter(|s| s.transcoding).count() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JellyfinOverview {
    pub system: Option<SystemInfo>,
    pub stats: JellyfinStats,
    pub item_counts: ItemCounts,
    pub libraries: Vec<VirtualFolder>,
    pub sessions: Vec<Session>,
}

pub struct JellyfinClient<'a> {
    http: &'a Upstream,
    base: &'a str,
    api_key: &'a str,
}

impl<'a> JellyfinClient<'a> {
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
                UpstreamRequest::get(format!("{}{path}", self.base))
                    .header("X-Emby-Token", self.api_key),
            )
            .await
    }

    async fn sessions(&self) -> Result<Vec<Session>, UpstreamError> {
        let raw: Vec<RawSession> = self.get("/Sessions").await?;
        Ok(raw.into_iter().filter_map(Session::from_raw).collect())
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<JellyfinOverview, ServiceError> {
    let client = JellyfinClient::new(upstream, profile)?;

    let (system, sessions, counts, libraries) = tokio::join!(
        client.get::<SystemInfo>("/System/Info"),
        client.sessions(),
        client.get::<ItemCounts>("/Items/Counts"),
        client.get::<Vec<VirtualFolder>>("/Library/VirtualFolders"),
    );

    let system = settled(instance, "System/Info", system);
    let sessions = settled_or_default(instance, "Sessions", sessions);
    let item_counts = settled_or_default(instance, "Items/Counts", counts);
    let libraries = settled_or_default(instance, "Library/VirtualFolders", libraries);

    Ok(JellyfinOverview {
        system,
        stats: JellyfinStats::derive(&item_counts, &libraries, &sessions),
        item_counts,
        libraries,
        sessions,
    })
}
