use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::arr::{calendar_window, ArrClient, DiskSpace, HealthCheck, Page, SystemStatus};
use crate::api::{null_default, OverviewOptions};
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Series {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    pub title: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub monitored: bool,
    pub status: Option<String>,
    pub network: Option<String>,
    pub year: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub statistics: SeriesStatistics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeriesStatistics {
    #[serde(deserialize_with = "null_default")]
    pub season_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub episode_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub episode_file_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub total_episode_count: i64,
    #[serde(deserialize_with = "null_default")]
    pub size_on_disk: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueRecord {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_default")]
    pub series_id: i64,
    #[serde(deserialize_with = "null_default")]
    pub episode_id: i64,
    pub title: Option<String>,
    pub status: Option<String>,
    pub tracked_download_state: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub size: f64,
    #[serde(deserialize_with = "null_default")]
    pub sizeleft: f64,
    pub timeleft: Option<String>,
    pub protocol: Option<String>,
    pub download_client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Episode {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_default")]
    pub series_id: i64,
    #[serde(deserialize_with = "null_default")]
    pub season_number: i64,
    #[serde(deserialize_with = "null_default")]
    pub episode_number: i64,
    pub title: Option<String>,
    pub air_date_utc: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub has_file: bool,
    #[serde(deserialize_with = "null_default")]
    pub monitored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarrStats {
    pub total_shows: i64,
    pub monitored_shows: i64,
    pub total_episodes: i64,
    pub episodes_on_disk: i64,
    pub missing_episodes: i64,
    pub queue_count: i64,
    pub size_on_disk: i64,
    pub health_issues: i64,
}

impl SonarrStats {
    pub fn derive(
        series: &[Series],
        queue: &Page<QueueRecord>,
        missing: &Page<IgnoredAny>,
        health: &[HealthCheck],
    ) -> Self {
        Self {
            total_shows: series.len() as i64,
            monitored_shows: series.iter().filter(|s| s.monitored).count() as i64,
            total_episodes: series.iter().map(|s| s.statistics.episode_count).sum(),
            episodes_on_disk: series.iter().map(|s| s.statistics.episode_file_count).sum(),
            missing_episodes: missing.count(),
            queue_count: queue.count(),
            size_on_disk: series.iter().map(|s| s.statistics.size_on_disk).sum(),
            health_issues: health.len() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarrOverview {
    pub system: Option<SystemStatus>,
    pub stats: SonarrStats,
    pub health: Vec<HealthCheck>,
    pub disk_space: Vec<DiskSpace>,
    pub queue: Vec<QueueRecord>,
    pub calendar: Vec<Episode>,
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
    options: &OverviewOptions,
) -> Result<SonarrOverview, ServiceError> {
    let client = ArrClient::new(upstream, profile, "v3")?;
    let (start, end) = calendar_window(options.calendar_days);
    let calendar_path = format!("calendar?start={start}&end={end}");

    let (status, health, series, queue, calendar, disk, missing) = tokio::join!(
        client.system_status(),
        client.health(),
        client.get::<Vec<Series>>("series"),
        client.get::<Page<QueueRecord>>("queue?pageSize=50"),
        client.get::<Vec<Episode>>(&calendar_path),
        client.disk_space(),
        client.get::<Page<IgnoredAny>>("wanted/missing?pageSize=1"),
    );

    let system = settled(instance, "system/status", status);
    let health = settled_or_default(instance, "health", health);
    let series = settled_or_default(instance, "series", series);
    let queue = settled_or_default(instance, "queue", queue);
    let calendar = settled_or_default(instance, "calendar", calendar);
    let disk_space = settled_or_default(instance, "diskspace", disk);
    let missing = settled_or_default(instance, "wanted/missing", missing);

    let stats = SonarrStats::derive(&series, &queue, &missing, &health);

    let titles: HashMap<i64, &str> = series
        .iter()
        .filter_map(|s| Some((s.id, s.title.as_deref()?)))
        .collect();
    let series_title = |id: i64| titles.get(&id).map(|t| t.to_string());

    let queue = queue
        .records
        .into_iter()
        .map(|mut record| {
            record.series_title = series_title(record.series_id);
            record
        })
        .collect();
    let calendar = calendar
        .into_iter()
        .map(|mut episode| {
            if episode.series_title.is_none() {
                episode.series_title = series_title(episode.series_id);
            }
            episode
        })
        .collect();

    Ok(SonarrOverview {
        system,
        stats,
        health,
        disk_space,
        queue,
        calendar,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetail {
    pub series: Series,
    pub episodes: Vec<Episode>,
    pub missing_episodes: i64,
}

/// One series plus its episode list. The series itself is required; a failed
/// episode fetch degrades to an empty list.
pub async fn series_detail(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
    series_id: i64,
) -> Result<SeriesDetail, ServiceError> {
    let client = ArrClient::new(upstream, profile, "v3")?;
    let series_path = format!("series/{series_id}");
    let episodes_path = format!("episode?seriesId={series_id}");

    let (series, episodes) = tokio::join!(
        client.get::<Series>(&series_path),
        client.get::<Vec<Episode>>(&episodes_path),
    );

    let series = series.map_err(|e| match e {
        UpstreamError::Status { status: 404, .. } => {
            ServiceError::NotFound(format!("series {series_id}"))
        }
        other => other.into(),
    })?;
    let episodes = settled_or_default(instance, "episode", episodes);
    let missing_episodes = episodes
        .iter()
        .filter(|e| e.monitored && !e.has_file && e.air_date_utc.is_some())
        .count() as i64;

    Ok(SeriesDetail {
        series,
        episodes,
        missing_episodes,
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
            url: "http://sonarr:8989".into(),
            credentials: Credentials {
                api_key: Some("k".into()),
                ..Default::default()
            },
        }
    }

    fn series_fixture() -> serde_json::Value {
        json!([
            {"id": 1, "title": "Alpha", "monitored": true,
             "statistics": {"episodeCount": 10, "episodeFileCount": 8, "sizeOnDisk": 1000}},
            {"id": 2, "title": "Beta", "monitored": true,
             "statistics": {"episodeCount": 5, "episodeFileCount": null}},
            {"id": 3, "title": "Gamma", "monitored": false}
        ])
    }

    #[tokio::test]
    async fn derives_stats_and_enriches_queue_from_series_batch() {
        let (upstream, mock) = MockTransport::new()
            .json("/api/v3/system/status", json!({"version": "4.0.1"}))
            .json("/api/v3/health", json!([{"source": "IndexerCheck", "type": "warning"}]))
            .json("/api/v3/series", series_fixture())
            .json(
                "/api/v3/queue",
                json!({"totalRecords": 1, "records": [{"id": 9, "seriesId": 2, "size": 100.0, "sizeleft": 40.0}]}),
            )
            .json("/api/v3/calendar", json!([{"id": 4, "seriesId": 1, "title": "Pilot"}]))
            .json("/api/v3/diskspace", json!([{"path": "/tv", "freeSpace": 5, "totalSpace": 10}]))
            .json("/api/v3/wanted/missing", json!({"totalRecords": 7, "records": [{}]}))
            .into_upstream();

        let doc = overview(&upstream, "sonarr1", &profile(), &OverviewOptions::default())
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 7);
        assert_eq!(doc.system.unwrap().version.as_deref(), Some("4.0.1"));
        assert_eq!(
            doc.stats,
            SonarrStats {
                total_shows: 3,
                monitored_shows: 2,
                total_episodes: 15,
                episodes_on_disk: 8,
                missing_episodes: 7,
                queue_count: 1,
                size_on_disk: 1000,
                health_issues: 1,
            }
        );
        assert_eq!(doc.queue[0].series_title.as_deref(), Some("Beta"));
        assert_eq!(doc.calendar[0].series_title.as_deref(), Some("Alpha"));
    }

    #[tokio::test]
    async fn one_failed_call_only_defaults_its_own_section() {
        let (upstream, _) = MockTransport::new()
            .json("/api/v3/series", series_fixture())
            .fail("/api/v3/queue")
            .into_upstream();

        let doc = overview(&upstream, "sonarr1", &profile(), &OverviewOptions::default())
            .await
            .unwrap();

        assert_eq!(doc.stats.total_shows, 3);
        assert_eq!(doc.stats.queue_count, 0);
        assert!(doc.queue.is_empty());
        assert!(doc.system.is_none());
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_before_any_call() {
        let (upstream, mock) = MockTransport::new().into_upstream();
        let mut p = profile();
        p.credentials.api_key = None;

        let err = overview(&upstream, "sonarr1", &p, &OverviewOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::MissingCredentials("apiKey")));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn series_detail_maps_upstream_404_to_not_found() {
        let (upstream, _) = MockTransport::new().into_upstream();
        let err = series_detail(&upstream, "sonarr1", &profile(), 99)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn series_detail_counts_missing_aired_episodes() {
        let (upstream, _) = MockTransport::new()
            .json("/api/v3/series/1", json!({"id": 1, "title": "Alpha", "monitored": true}))
            .json(
                "/api/v3/episode",
                json!([
                    {"id": 1, "monitored": true, "hasFile": false, "airDateUtc": "2024-01-01T00:00:00Z"},
                    {"id": 2, "monitored": true, "hasFile": true, "airDateUtc": "2024-01-08T00:00:00Z"},
                    {"id": 3, "monitored": true, "hasFile": false}
                ]),
            )
            .into_upstream();

        let detail = series_detail(&upstream, "sonarr1", &profile(), 1).await.unwrap();
        assert_eq!(detail.series.title.as_deref(), Some("Alpha"));
        assert_eq!(detail.episodes.len(), 3);
        assert_eq!(detail.missing_episodes, 1);
    }
}
