//! UniFi: the cloud Site Manager API plus any number of local Network
//! integration keys (one per console). Local data, when present, is
//! authoritative for device and client totals.

use futures::future::join_all;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::api::null_default;
use crate::error::ServiceError;
use crate::models::Profile;
use crate::upstream::{settled_or_default, Upstream, UpstreamError, UpstreamRequest};

pub const SITE_MANAGER_URL: &str = "https://api.ui.com";

/// `{"data": [...], "totalCount": n}` as returned by both APIs.
#[derive(Debug, Deserialize)]
#[serde(
    rename_all = "camelCase",
    default,
    bound(deserialize = "T: Deserialize<'de>")
)]
struct Listing<T> {
    #[serde(deserialize_with = "null_default")]
    data: Vec<T>,
    #[serde(deserialize_with = "null_default")]
    total_count: i64,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total_count: 0,
        }
    }
}

impl<T> Listing<T> {
    fn count(&self) -> i64 {
        self.total_count.max(self.data.len() as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Host {
    pub id: Option<String>,
    pub hardware_id: Option<String>,
    #[serde(rename = "type")]
    pub host_type: Option<String>,
    pub ip_address: Option<String>,
    pub reported_state: Option<ReportedState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportedState {
    pub hostname: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudSite {
    pub site_id: Option<String>,
    pub host_id: Option<String>,
    pub meta: Option<SiteMeta>,
    pub statistics: Option<SiteStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteMeta {
    pub name: Option<String>,
    pub desc: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteStatistics {
    pub counts: SiteCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteCounts {
    #[serde(deserialize_with = "null_default")]
    pub total_device: i64,
    #[serde(deserialize_with = "null_default")]
    pub offline_device: i64,
    #[serde(deserialize_with = "null_default")]
    pub wifi_client: i64,
    #[serde(deserialize_with = "null_default")]
    pub wired_client: i64,
}

impl CloudSite {
    fn counts(&self) -> SiteCounts {
        self.statistics
            .as_ref()
            .map(|s| s.counts.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawLocalSite {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    pub id: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub mac_address: Option<String>,
    pub ip_address: Option<String>,
    pub state: Option<String>,
}

impl Device {
    fn is_online(&self) -> bool {
        self.state.as_deref() == Some("ONLINE")
    }
}

/// One site reached through a local integration key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSite {
    pub id: String,
    pub name: Option<String>,
    pub device_count: i64,
    pub online_devices: i64,
    pub client_count: i64,
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiStats {
    pub total_hosts: i64,
    pub total_sites: i64,
    pub total_devices: i64,
    pub online_devices: i64,
    pub total_clients: i64,
}

impl UnifiStats {
    pub fn derive(hosts: &[Host], cloud_sites: &[CloudSite], local_sites: &[LocalSite]) -> Self {
        if local_sites.is_empty() {
            let counts: Vec<SiteCounts> = cloud_sites.iter().map(CloudSite::counts).collect();
            let total: i64 = counts.iter().map(|c| c.total_device).sum();
            let offline: i64 = counts.iter().map(|c| c.offline_device).sum();
            Self {
                total_hosts: hosts.len() as i64,
                total_sites: cloud_sites.len() as i64,
                total_devices: total,
                online_devices: total - offline,
                total_clients: counts.iter().map(|c| c.wifi_client + c.wired_client).sum(),
            }
        } else {
            Self {
                total_hosts: hosts.len() as i64,
                total_sites: local_sites.len() as i64,
                total_devices: local_sites.iter().map(|s| s.device_count).sum(),
                online_devices: local_sites.iter().map(|s| s.online_devices).sum(),
                total_clients: local_sites.iter().map(|s| s.client_count).sum(),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiOverview {
    pub stats: UnifiStats,
    pub hosts: Vec<Host>,
    pub cloud_sites: Vec<CloudSite>,
    pub sites: Vec<LocalSite>,
}

pub struct UnifiClient<'a> {
    http: &'a Upstream,
    local_base: String,
}

impl<'a> UnifiClient<'a> {
    pub fn new(http: &'a Upstream, profile: &Profile) -> Self {
        Self {
            http,
            local_base: format!("{}/proxy/network/integration/v1", profile.url),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: String, key: &str) -> Result<T, UpstreamError> {
        self.http
            .get_json(
                UpstreamRequest::get(url)
                    .header("X-API-KEY", key)
                    .header("Accept", "application/json"),
            )
            .await
    }

    async fn hosts(&self, key: &str) -> Result<Listing<Host>, UpstreamError> {
        self.get(format!("{SITE_MANAGER_URL}/ea/hosts"), key).await
    }

    async fn cloud_sites(&self, key: &str) -> Result<Listing<CloudSite>, UpstreamError> {
        self.get(format!("{SITE_MANAGER_URL}/ea/sites"), key).await
    }

    async fn local_sites(&self, key: &str) -> Result<Listing<RawLocalSite>, UpstreamError> {
        self.get(format!("{}/sites", self.local_base), key).await
    }

    async fn devices(&self, key: &str, site: &str) -> Result<Listing<Device>, UpstreamError> {
        self.get(format!("{}/sites/{site}/devices?limit=200", self.local_base), key)
            .await
    }

    async fn clients(&self, key: &str, site: &str) -> Result<Listing<IgnoredAny>, UpstreamError> {
        self.get(format!("{}/sites/{site}/clients?limit=1", self.local_base), key)
            .await
    }
}

pub async fn overview(
    upstream: &Upstream,
    instance: &str,
    profile: &Profile,
) -> Result<UnifiOverview, ServiceError> {
    let manager_key = profile.site_manager_key();
    let site_keys = profile.credentials.site_keys();
    if manager_key.is_none() && site_keys.is_empty() {
        return Err(ServiceError::MissingCredentials("apiKey"));
    }
    let client = UnifiClient::new(upstream, profile);
    let client = &client;

    let cloud = async {
        let Some(key) = manager_key else {
            return (Vec::new(), Vec::new());
        };
        let (hosts, sites) = tokio::join!(client.hosts(key), client.cloud_sites(key));
        (
            settled_or_default(instance, "ea/hosts", hosts).data,
            settled_or_default(instance, "ea/sites", sites).data,
        )
    };
    let local = join_all(site_keys.iter().map(|&key| async move {
        let sites = settled_or_default(instance, "integration/sites", client.local_sites(key).await);
        (key, sites.data)
    }));
    let ((hosts, cloud_sites), local) = tokio::join!(cloud, local);

    // Second wave: devices and clients for every site found above.
    let sites = join_all(
        local
            .into_iter()
            .flat_map(|(key, sites)| sites.into_iter().map(move |site| (key, site)))
            .map(|(key, site)| async move {
                let (devices, clients) =
                    tokio::join!(client.devices(key, &site.id), client.clients(key, &site.id));
                let devices = settled_or_default(instance, "integration/devices", devices);
                let clients = settled_or_default(instance, "integration/clients", clients);
                LocalSite {
                    device_count: devices.count(),
                    online_devices: devices.data.iter().filter(|d| d.is_online()).count() as i64,
                    client_count: clients.count(),
                    devices: devices.data,
                    id: site.id,
                    name: site.name,
                }
            }),
    )
    .await;

    Ok(UnifiOverview {
        stats: UnifiStats::derive(&hosts, &cloud_sites, &sites),
        hosts,
        cloud_sites,
        sites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Credentials;
    use crate::upstream::mock::MockTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn profile(credentials: Credentials) -> Profile {
        Profile {
            url: "https://192.168.1.1".into(),
            credentials,
        }
    }

    #[tokio::test]
    async fn local_sites_drive_device_totals() {
        let (upstream, mock) = MockTransport::new()
            .json(
                "/proxy/network/integration/v1/sites",
                json!({"data": [{"id": "s1", "name": "Default"}], "totalCount": 1}),
            )
            .json(
                "/proxy/network/integration/v1/sites/s1/devices",
                json!({"data": [
                    {"name": "gw", "state": "ONLINE"},
                    {"name": "ap", "state": "OFFLINE"},
                    {"name": "sw", "state": "ONLINE"}
                ], "totalCount": 3}),
            )
            .json(
                "/proxy/network/integration/v1/sites/s1/clients",
                json!({"data": [{}], "totalCount": 27}),
            )
            .json("/ea/hosts", json!({"data": [{"id": "h1"}]}))
            .json("/ea/sites", json!({"data": [{"siteId": "c1"}]}))
            .into_upstream();

        let doc = overview(
            &upstream,
            "unifi1",
            &profile(Credentials {
                api_key1: Some("local".into()),
                site_manager_api_key: Some("cloud".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(mock.call_count(), 5);
        assert_eq!(
            doc.stats,
            UnifiStats {
                total_hosts: 1,
                total_sites: 1,
                total_devices: 3,
                online_devices: 2,
                total_clients: 27,
            }
        );
        assert_eq!(doc.sites[0].name.as_deref(), Some("Default"));
    }

    #[tokio::test]
    async fn cloud_statistics_are_used_without_local_keys() {
        let (upstream, mock) = MockTransport::new()
            .json("/ea/hosts", json!({"data": [{"id": "h1"}, {"id": "h2"}]}))
            .json(
                "/ea/sites",
                json!({"data": [{"siteId": "c1", "statistics": {"counts": {
                    "totalDevice": 8, "offlineDevice": 1, "wifiClient": 20, "wiredClient": 5
                }}}]}),
            )
            .into_upstream();

        let doc = overview(
            &upstream,
            "unifi1",
            &profile(Credentials {
                site_manager_api_key: Some("cloud".into()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(doc.stats.total_hosts, 2);
        assert_eq!(doc.stats.total_devices, 8);
        assert_eq!(doc.stats.online_devices, 7);
        assert_eq!(doc.stats.total_clients, 25);
    }

    #[tokio::test]
    async fn no_keys_is_missing_credentials() {
        let (upstream, mock) = MockTransport::new().into_upstream();
        let err = overview(&upstream, "unifi1", &profile(Credentials::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingCredentials("apiKey")));
        assert_eq!(mock.call_count(), 0);
    }
}
