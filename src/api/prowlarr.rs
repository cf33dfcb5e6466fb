use serde::{Deserialize, Serialize};

use crate::api::arr::{ArrClient, HealthCheck, SystemStatus};
use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Indexer {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    pub name: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub enable: bool,
    pub protocol: Option<String>,
    pub privacy: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub priority: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexerStat {
    #[serde(deserialize_with = "null_default")]
    pub indexer_id: i64,
    pub indexer_name: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub number_of_queries: i64,
    #[serde(deserialize_with = "null_default")]
    pub number_of_grabs: i64,
    #[serde(deserialize_with = "null_default")]
    pub number_of_failed_queries: i64,
    #[serde(deserialize_with = "null_default")]
    pub number_of_failed_grabs: i64,
    #[serde(deserialize_with = "null_default")]
    pub average_response_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct IndexerStats {
    #[serde(deserialize_with = "null_default")]
    indexers: Vec<IndexerStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProwlarrStats {
    pub total_indexers: i64,
    pub enabled_indexers: i64,
    pub total_queries: i64,
    pub total_grabs: i64,
    pub failed_queries: i64,
    pub health_issues: i64,
}

impl ProwlarrStats {
    pub fn derive(indexers: &[Indexer], stats: &[IndexerStat], health: &[HealthCheck]) -> Self {
        Self {
            total_indexers: indexers.len() as i64,
            enabled_indexers: indexers.iter().filter(|i| i.enable).count() as i64,
            total_queries: stats.iter().map(|s| s.number_of_queries).sum(),
            total_grabs: stats.iter().map(|s| s.number_of_grabs).sum(),
            failed_queries: stats.iter().map(|s| s.number_of_failed_queries).sum(),
            health_issues: health.len() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProwlarrOverview {
    pub system: Option<SystemStatus>,
    pub stats: ProwlarrStats,
    pub health: Vec<HealthCheck>,
    pub indexers: Vec<Indexer>,
    pub indexer_stats: Vec<IndexerStat>,
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<ProwlarrOverview, ServiceError> {
    let client = ArrClient::new(upstream, profile, "v1")?;

    let (status, health, indexers, indexer_stats) = tokio::join!(
        client.system_status(),
        client.health(),
        client.get::<Vec<Indexer>>("indexer"),
        client.get::<IndexerStats>("indexerstats"),
    );

    let system = settled(instance, "system/status", status);
    let health = settled_or_default(instance, "health", health);
    let indexers = settled_or_default(instance, "indexer", indexers);
    let indexer_stats = settled_or_default(instance, "indexerstats", indexer_stats).indexers;

    Ok(ProwlarrOverview {
        system,
        stats: ProwlarrStats::derive(&indexers, &indexer_stats, &health),
        health,
        indexers,
        indexer_stats,
    })
}
