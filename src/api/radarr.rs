use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::arr::{calendar_window, ArrClient, DiskSpace, HealthCheck, Page, SystemStatus};
use crate::api::{null_default, OverviewOptions};
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled, settled_or_default, Upstream, UpstreamError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Movie {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    pub title: Option<String>,
    pub year: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub monitored: bool,
    #[serde(deserialize_with = "null_default")]
    pub has_file: bool,
    #[serde(deserialize_with = "null_default")]
    pub is_available: bool,
    #[serde(deserialize_with = "null_default")]
    pub size_on_disk: i64,
    pub status: Option<String>,
    pub tmdb_id: Option<i64>,
    pub in_cinemas: Option<String>,
    pub digital_release: Option<String>,
    pub physical_release: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueRecord {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_default")]
    pub movie_id: i64,
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
    pub movie_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_year: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MovieFile {
    #[serde(deserialize_with = "null_default")]
    pub id: i64,
    pub relative_path: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub size: i64,
    pub date_added: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarrStats {
    pub total_movies: i64,
    pub monitored_movies: i64,
    pub movies_on_disk: i64,
    pub missing_movies: i64,
    pub queue_count: i64,
    pub size_on_disk: i64,
    pub health_issues: i64,
}

impl RadarrStats {
    pub fn derive(movies: &[Movie], queue: &Page<QueueRecord>, health: &[HealthCheck]) -> Self {
        Self {
            total_movies: movies.len() as i64,
            monitored_movies: movies.iter().filter(|m| m.monitored).count() as i64,
            movies_on_disk: movies.iter().filter(|m| m.has_file).count() as i64,
            missing_movies: movies
                .iter()
                .filter(|m| m.monitored && !m.has_file && m.is_available)
                .count() as i64,
            queue_count: queue.count(),
            size_on_disk: movies.iter().map(|m| m.size_on_disk).sum(),
            health_issues: health.len() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarrOverview {
    pub system: Option<SystemStatus>,
    pub stats: RadarrStats,
    pub health: Vec<HealthCheck>,
    pub disk_space: Vec<DiskSpace>,
    pub queue: Vec<QueueRecord>,
    pub calendar: Vec<Movie>,
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
    options: &OverviewOptions,
) -> Result<RadarrOverview, ServiceError> {
    let client = ArrClient::new(upstream, profile, "v3")?;
    let (start, end) = calendar_window(options.calendar_days);
    let calendar_path = format!("calendar?start={start}&end={end}");

    let (status, health, movies, queue, calendar, disk) = tokio::join!(
        client.system_status(),
        client.health(),
        client.get::<Vec<Movie>>("movie"),
        client.get::<Page<QueueRecord>>("queue?pageSize=50"),
        client.get::<Vec<Movie>>(&calendar_path),
        client.disk_space(),
    );

    let system = settled(instance, "system/status", status);
    let health = settled_or_default(instance, "health", health);
    let movies = settled_or_default(instance, "movie", movies);
    let queue = settled_or_default(instance, "queue", queue);
    let calendar = settled_or_default(instance, "calendar", calendar);
    let disk_space = settled_or_default(instance, "diskspace", disk);

    let stats = RadarrStats::derive(&movies, &queue, &health);

    let by_id: HashMap<i64, &Movie> = movies.iter().map(|m| (m.id, m)).collect();
    let queue = queue
        .records
        .into_iter()
        .map(|mut record| {
            if let Some(movie) = by_id.get(&record.movie_id) {
                record.movie_title = movie.title.clone();
                record.movie_year = movie.year;
            }
            record
        })
        .collect();

    Ok(RadarrOverview {
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
pub struct MovieDetail {
    pub movie: Movie,
    pub files: Vec<MovieFile>,
}

pub async fn movie_detail(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
    movie_id: i64,
) -> Result<MovieDetail, ServiceError> {
    let client = ArrClient::new(upstream, profile, "v3")?;
    let movie_path = format!("movie/{movie_id}");
    let files_path = format!("moviefile?movieId={movie_id}");

    let (movie, files) = tokio::join!(
        client.get::<Movie>(&movie_path),
        client.get::<Vec<MovieFile>>(&files_path),
    );

    let movie = movie.map_err(|e| match e {
        UpstreamError::Status { status: 404, .. } => {
            ServiceError::NotFound(format!("movie {movie_id}"))
        }
        other => other.into(),
    })?;
    let files = settled_or_default(instance, "moviefile", files);

    Ok(MovieDetail { movie, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use crate::upstream::mock::MockTransport;
    use serde_json::json;

    fn profile() -> Profile {
        Profile {
            url: "http://radarr:7878".into(),
            credentials: Credentials {
                api_key: Some("k".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn counts_missing_only_for_available_monitored_movies() {
        let (upstream, _) = MockTransport::new()
            .json(
                "/api/v3/movie",
                json!([
                    {"id": 1, "title": "A", "monitored": true, "hasFile": true, "sizeOnDisk": 700},
                    {"id": 2, "title": "B", "monitored": true, "hasFile": false, "isAvailable": true},
                    {"id": 3, "title": "C", "monitored": true, "hasFile": false, "isAvailable": false},
                    {"id": 4, "title": "D", "monitored": false, "sizeOnDisk": null}
                ]),
            )
            .json(
                "/api/v3/queue",
                json!({"totalRecords": 1, "records": [{"id": 5, "movieId": 2}]}),
            )
            .into_upstream();

        let doc = overview(&upstream, "radarr1", &profile(), &OverviewOptions::default())
            .await
            .unwrap();

        assert_eq!(doc.stats.total_movies, 4);
        assert_eq!(doc.stats.monitored_movies, 3);
        assert_eq!(doc.stats.movies_on_disk, 1);
        assert_eq!(doc.stats.missing_movies, 1);
        assert_eq!(doc.stats.size_on_disk, 700);
        assert_eq!(doc.queue[0].movie_title.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn queue_items_without_a_matching_movie_pass_through() {
        let (upstream, _) = MockTransport::new()
            .json("/api/v3/queue", json!({"records": [{"id": 5, "movieId": 42, "title": "x"}]}))
            .into_upstream();

        let doc = overview(&upstream, "radarr1", &profile(), &OverviewOptions::default())
            .await
            .unwrap();

        let item = serde_json::to_value(&doc.queue[0]).unwrap();
        assert!(item.get("movieTitle").is_none());
        assert_eq!(item["title"], "x");
        assert_eq!(doc.stats.queue_count, 1);
    }

    #[tokio::test]
    async fn movie_detail_keeps_movie_when_files_fail() {
        let (upstream, _) = MockTransport::new()
            .json("/api/v3/movie/2", json!({"id": 2, "title": "B"}))
            .fail("/api/v3/moviefile")
            .into_upstream();

        let detail = movie_detail(&upstream, "radarr1", &profile(), 2).await.unwrap();
        assert_eq!(detail.movie.title.as_deref(), Some("B"));
        assert!(detail.files.is_empty());
    }
}
