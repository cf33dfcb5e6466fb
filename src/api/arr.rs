//! Pieces shared by the *arr family (Sonarr, Radarr, Prowlarr): same auth
//! header, same system/health/disk endpoints, same paging envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{Upstream, UpstreamError, UpstreamRequest};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemStatus {
    pub app_name: Option<String>,
    pub instance_name: Option<String>,
    pub version: Option<String>,
    pub branch: Option<String>,
    pub os_name: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub is_docker: bool,
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheck {
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub level: Option<String>,
    pub message: Option<String>,
    pub wiki_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiskSpace {
    pub path: Option<String>,
    pub label: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub free_space: i64,
    #[serde(deserialize_with = "null_default")]
    pub total_space: i64,
}

/// Paged envelope used by queue and wanted endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(deserialize_with = "null_default")]
    pub total_records: i64,
    #[serde(deserialize_with = "null_default")]
    pub records: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total_records: 0,
            records: Vec::new(),
        }
    }
}

impl<T> Page<T> {
    /// Reported total, or the number of records on the page when the total is absent.
    pub fn count(&self) -> i64 {
        self.total_records.max(self.records.len() as i64)
    }
}

pub struct ArrClient<'a> {
    http: &'a Upstream,
    base: String,
    api_key: &'a str,
}

impl<'a> ArrClient<'a> {
    pub fn new(
        http: &'a Upstream,
        profile: &'a Profile,
        api_version: &str,
    ) -> Result<Self, ServiceError> {
        let api_key = profile
            .api_key()
            .ok_or(ServiceError::MissingCredentials("apiKey"))?;
        Ok(Self {
            http,
            base: format!("{}/api/{}", profile.url, api_version),
            api_key,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpstreamError> {
        self.http
            .get_json(
                UpstreamRequest::get(format!("{}/{}", self.base, path))
                    .header("X-Api-Key", self.api_key),
            )
            .await
    }

    pub async fn system_status(&self) -> Result<SystemStatus, UpstreamError> {
        self.get("system/status").await
    }

    pub async fn health(&self) -> Result<Vec<HealthCheck>, UpstreamError> {
        self.get("health").await
    }

    pub async fn disk_space(&self) -> Result<Vec<DiskSpace>, UpstreamError> {
        self.get("diskspace").await
    }
}

/// `[today, today + days]` as `YYYY-MM-DD` strings.
pub fn calendar_window(days: i64) -> (String, String) {
    let start = chrono::Utc::now();
    let end = start + chrono::Duration::days(days);
    (
        start.format("%Y-%m-%d").to_string(),
        end.format("%Y-%m-%d").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_tolerates_nulls_and_missing_totals() {
        let page: Page<i64> = serde_json::from_value(json!({"records": [1, 2]})).unwrap();
        assert_eq!(page.count(), 2);
        let page: Page<i64> =
            serde_json::from_value(json!({"totalRecords": null, "records": null})).unwrap();
        assert_eq!(page.count(), 0);
        let page: Page<i64> =
            serde_json::from_value(json!({"totalRecords": 40, "records": [1]})).unwrap();
        assert_eq!(page.count(), 40);
    }

    #[test]
    fn client_requires_api_key() {
        let (upstream, _) = crate::upstream::mock::MockTransport::new().into_upstream();
        let profile = Profile {
            url: "http://sonarr".into(),
            ..Default::default()
        };
        assert!(matches!(
            ArrClient::new(&upstream, &profile, "v3"),
            Err(ServiceError::MissingCredentials("apiKey"))
        ));
    }
}
