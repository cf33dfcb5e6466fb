use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::{lenient_f64, lenient_i64, null_default};
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError, UpstreamRequest};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct VersionReply {
    version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct QueueReply {
    queue: Queue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Queue {
    pub status: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub paused: bool,
    #[serde(deserialize_with = "lenient_f64")]
    pub kbpersec: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub mbleft: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub mb: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub noofslots: i64,
    pub timeleft: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub slots: Vec<QueueSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSlot {
    pub nzo_id: Option<String>,
    pub filename: Option<String>,
    pub status: Option<String>,
    pub cat: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub mb: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub mbleft: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub percentage: i64,
    pub timeleft: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct HistoryReply {
    history: History,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct History {
    #[serde(deserialize_with = "lenient_i64")]
    pub noofslots: i64,
    pub total_size: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub slots: Vec<HistorySlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySlot {
    pub nzo_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub bytes: i64,
    pub completed: Option<i64>,
    pub fail_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerStats {
    #[serde(deserialize_with = "lenient_i64")]
    pub total: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub month: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub week: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub day: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SabnzbdStats {
    pub queue_size: i64,
    pub paused: bool,
    pub speed_kbps: f64,
    pub remaining_mb: f64,
    pub history_count: i64,
    pub failed_count: i64,
    pub total_downloaded_bytes: i64,
}

impl SabnzbdStats {
    pub fn derive(queue: &Queue, history: &History, server: &ServerStats) -> Self {
        Self {
            queue_size: queue.noofslots.max(queue.slots.len() as i64),
            paused: queue.paused,
            speed_kbps: queue.kbpersec,
            remaining_mb: queue.mbleft,
            history_count: history.noofslots.max(history.slots.len() as i64),
            failed_count: history
                .slots
                .iter()
                .filter(|s| s.status.as_deref() == Some("Failed"))
                .count() as i64,
            total_downloaded_bytes: server.total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SabnzbdOverview {
    pub version: Option<String>,
    pub stats: SabnzbdStats,
    pub queue: Queue,
    pub history: Vec<HistorySlot>,
    pub server_stats: ServerStats,
}

pub struct SabnzbdClient<'a> {
    http: &'a Upstream,
    base: String,
    api_key: String,
}

impl<'a> SabnzbdClient<'a> {
    pub fn new(http: &'a Upstream, profile: &Profile) -> Result<Self, ServiceError> {
        let api_key = profile
            .api_key()
            .ok_or(ServiceError::MissingCredentials("apiKey"))?;
        Ok(Self {
            http,
            base: format!("{}/api", profile.url),
            api_key: urlencoding::encode(api_key).into_owned(),
        })
    }

    pub async fn call<T: DeserializeOwned>(&self, mode: &str, extra: &str) -> Result<T, UpstreamError> {
        self.http
            .get_json(UpstreamRequest::get(format!(
                "{}?mode={mode}&output=json&apikey={}{extra}",
                self.base, self.api_key
            )))
            .await
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<SabnzbdOverview, ServiceError> {
    let client = SabnzbdClient::new(upstream, profile)?;

    let (version, queue, history, server) = tokio::join!(
        client.call::<VersionReply>("version", ""),
        client.call::<QueueReply>("queue", ""),
        client.call::<HistoryReply>("history", "&limit=10"),
        client.call::<ServerStats>("server_stats", ""),
    );

    let version = settled(instance, "version", version).and_then(|v| v.version);
    let queue = settled_or_default(instance, "queue", queue).queue;
    let history = settled_or_default(instance, "history", history).history;
    let server_stats = settled_or_default(instance, "server_stats", server);

    Ok(SabnzbdOverview {
        version,
        stats: SabnzbdStats::derive(&queue, &history, &server_stats),
        queue,
        history: history.slots,
        server_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use crate::upstream::mock::MockTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn profile() -> Profile {
        Profile {
            url: "http://sab:8080".into(),
            credentials: Credentials {
                api_key: Some("k".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn derives_queue_and_history_stats() {
        let (upstream, _) = MockTransport::new()
            .json("mode=version", json!({"version": "4.2.1"}))
            .json(
                "mode=queue",
                json!({"queue": {"paused": false, "kbpersec": "1536.5", "mbleft": "900.00",
                                 "noofslots": 2, "slots": [{"filename": "a"}, {"filename": "b"}]}}),
            )
            .json(
                "mode=history",
                json!({"history": {"noofslots": 120, "slots": [
                    {"name": "x", "status": "Completed", "bytes": 100},
                    {"name": "y", "status": "Failed", "fail_message": "CRC"}
                ]}}),
            )
            .json("mode=server_stats", json!({"total": 987654321, "month": 5}))
            .into_upstream();

        let doc = overview(&upstream, "sab1", &profile()).await.unwrap();

        assert_eq!(doc.version.as_deref(), Some("4.2.1"));
        assert_eq!(
            doc.stats,
            SabnzbdStats {
                queue_size: 2,
                paused: false,
                speed_kbps: 1536.5,
                remaining_mb: 900.0,
                history_count: 120,
                failed_count: 1,
                total_downloaded_bytes: 987654321,
            }
        );
    }

    #[tokio::test]
    async fn queue_failure_defaults_only_that_section() {
        let (upstream, _) = MockTransport::new()
            .json("mode=version", json!({"version": "4.2.1"}))
            .fail("mode=queue")
            .into_upstream();

        let doc = overview(&upstream, "sab1", &profile()).await.unwrap();
        assert_eq!(doc.version.as_deref(), Some("4.2.1"));
        assert_eq!(doc.queue, Queue::default());
        assert_eq!(doc.stats.queue_size, 0);
    }
}
