use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::{lenient_i64, null_default};
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

/// `{"response": {"result": "success", "message": null, "data": ...}}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Body<T>,
}

#[derive(Debug, Deserialize)]
struct Body<T> {
    #[serde(default)]
    result: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub pms_name: Option<String>,
    pub pms_version: Option<String>,
    pub pms_platform: Option<String>,
    pub pms_ip: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub pms_port: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    #[serde(deserialize_with = "lenient_i64")]
    pub stream_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub stream_count_direct_play: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub stream_count_direct_stream: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub stream_count_transcode: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub total_bandwidth: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub lan_bandwidth: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub wan_bandwidth: i64,
    #[serde(deserialize_with = "null_default")]
    pub sessions: Vec<Stream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stream {
    pub session_key: Option<String>,
    pub user: Option<String>,
    pub full_title: Option<String>,
    pub media_type: Option<String>,
    pub player: Option<String>,
    pub state: Option<String>,
    pub transcode_decision: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub progress_percent: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub bandwidth: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Library {
    #[serde(deserialize_with = "lenient_i64")]
    pub section_id: i64,
    pub section_name: Option<String>,
    pub section_type: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub parent_count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub child_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct HistoryPage {
    #[serde(rename = "recordsTotal", deserialize_with = "lenient_i64")]
    records_total: i64,
    #[serde(deserialize_with = "null_default")]
    data: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    pub date: Option<i64>,
    pub user: Option<String>,
    pub full_title: Option<String>,
    pub media_type: Option<String>,
    pub watched_status: Option<f64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub duration: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeStat {
    pub stat_id: Option<String>,
    pub stat_title: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub rows: Vec<HomeStatRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeStatRow {
    pub title: Option<String>,
    pub user: Option<String>,
    pub thumb: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub total_plays: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub users_watched: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TautulliStats {
    pub stream_count: i64,
    pub transcode_count: i64,
    pub direct_play_count: i64,
    pub total_bandwidth_kbps: i64,
    pub library_count: i64,
    pub total_items: i64,
    pub total_plays: i64,
}

impl TautulliStats {
    pub fn derive(activity: &Activity, libraries: &[Library], history_total: i64) -> Self {
        Self {
            stream_count: activity.stream_count,
            transcode_count: activity.stream_count_transcode,
            direct_play_count: activity.stream_count_direct_play,
            total_bandwidth_kbps: activity.total_bandwidth,
            library_count: libraries.len() as i64,
            total_items: libraries.iter().map(|l| l.count).sum(),
            total_plays: history_total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TautulliOverview {
    pub server: Option<ServerInfo>,
    pub stats: TautulliStats,
    pub activity: Activity,
    pub libraries: Vec<Library>,
    pub history: Vec<HistoryEntry>,
    pub home_stats: Vec<HomeStat>,
}

pub struct TautulliClient<'a> {
    http: &'a Upstream,
    base: String,
}

impl<'a> TautulliClient<'a> {
    pub fn new(http: &'a Upstream, profile: &Profile) -> Result<Self, ServiceError> {
        let api_key = profile
            .api_key()
            .ok_or(ServiceError::MissingCredentials("apiKey"))?;
        Ok(Self {
            http,
            base: format!(
                "{}/api/v2?apikey={}",
                profile.url,
                urlencoding::encode(api_key)
            ),
        })
    }

    /// Calls `cmd` and unwraps the response envelope. A non-success result is
    /// reported as a decode failure carrying Tautulli's own message.
    pub async fn command<T: DeserializeOwned + Default>(
        &self,
        cmd: &str,
        extra: &str,
    ) -> Result<T, UpstreamError> {
        let envelope: Envelope<T> = self
            .http
            .get_json(UpstreamRequest::get(format!("{}&cmd={cmd}{extra}", self.base)))
            .await?;
        let body = envelope.response;
        if body.result != "success" {
            return Err(UpstreamError::Decode(
                body.message
                    .unwrap_or_else(|| format!("{cmd} returned '{}'", body.result)),
            ));
        }
        Ok(body.data.unwrap_or_default())
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<TautulliOverview, ServiceError> {
    let client = TautulliClient::new(upstream, profile)?;

    let (server, activity, libraries, history, home_stats) = tokio::join!(
        client.command::<ServerInfo>("get_server_info", ""),
        client.command::<Activity>("get_activity", ""),
        client.command::<Vec<Library>>("get_libraries", ""),
        client.command::<HistoryPage>("get_history", "&length=10"),
        client.command::<Vec<HomeStat>>("get_home_stats", ""),
    );

    let server = settled(instance, "get_server_info", server);
    let activity = settled_or_default(instance, "get_activity", activity);
    let libraries = settled_or_default(instance, "get_libraries", libraries);
    let history = settled_or_default(instance, "get_history", history);
    let home_stats = settled_or_default(instance, "get_home_stats", home_stats);

    Ok(TautulliOverview {
        server,
        stats: TautulliStats::derive(&activity, &libraries, history.records_total),
        activity,
        libraries,
        history: history.data,
        home_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use crate::upstream::mock::MockTransport;
    use serde_json::json;

    fn profile() -> Profile {
        Profile {
            url: "http://tautulli:8181".into(),
            credentials: Credentials {
                api_key: Some("k".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn string_counters_are_summed() {
        let (upstream, mock) = MockTransport::new()
            .json(
                "cmd=get_activity",
                json!({"response": {"result": "success", "data": {
                    "stream_count": "3", "stream_count_transcode": "1",
                    "stream_count_direct_play": "2", "total_bandwidth": 12000,
                    "sessions": [{"user": "ann", "bandwidth": "4000"}]
                }}}),
            )
            .json(
                "cmd=get_libraries",
                json!({"response": {"result": "success", "data": [
                    {"section_id": "1", "section_name": "Movies", "count": "250"},
                    {"section_id": "2", "section_name": "TV", "count": 40}
                ]}}),
            )
            .json(
                "cmd=get_history",
                json!({"response": {"result": "success", "data": {"recordsTotal": 812, "data": []}}}),
            )
            .json(
                "cmd=get_server_info",
                json!({"response": {"result": "error", "message": "Invalid apikey", "data": {}}}),
            )
            .into_upstream();

        let doc = overview(&upstream, "tautulli1", &profile()).await.unwrap();

        assert_eq!(mock.call_count(), 5);
        assert!(doc.server.is_none());
        assert_eq!(
            doc.stats,
            TautulliStats {
                stream_count: 3,
                transcode_count: 1,
                direct_play_count: 2,
                total_bandwidth_kbps: 12000,
                library_count: 2,
                total_items: 290,
                total_plays: 812,
            }
        );
        assert_eq!(doc.activity.sessions[0].bandwidth, 4000);
        assert!(doc.home_stats.is_empty());
    }

    #[tokio::test]
    async fn api_key_is_url_encoded() {
        let (upstream, mock) = MockTransport::new().into_upstream();
        let mut p = profile();
        p.credentials.api_key = Some("a b&c".into());
        let client = TautulliClient::new(&upstream, &p).unwrap();
        let _ = client.command::<ServerInfo>("get_server_info", "").await;
        assert!(mock.calls()[0].contains("apikey=a%20b%26c&cmd=get_server_info"));
    }
}
