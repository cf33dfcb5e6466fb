//! Per-service clients and the aggregation handlers built on them.
//!
//! Every `overview` follows one shape: check credentials, fan out a fixed batch
//! with `tokio::join!`, default whatever failed, derive stats, optionally enrich.

pub mod arr;
pub mod bazarr;
pub mod jellyfin;
pub mod plex;
pub mod probe;
pub mod prowlarr;
pub mod qbittorrent;
pub mod radarr;
pub mod sabnzbd;
pub mod seerr;
pub mod sonarr;
pub mod tautulli;
pub mod unifi;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ServiceError;
use crate::models::{Profile, ServiceType};
use crate::upstream::Upstream;

/// Per-request knobs taken from the query string.
#[derive(Debug, Clone)]
pub struct OverviewOptions {
    pub calendar_days: i64,
}

impl Default for OverviewOptions {
    fn default() -> Self {
        Self { calendar_days: 7 }
    }
}

/// Builds the overview document for any service type.
pub async fn overview(
    upstream: &Upstream,
    service_type: ServiceType,
    instance: &str,
    profile: &Profile,
    options: &OverviewOptions,
) -> Result<Value, ServiceError> {
    let doc = match service_type {
        ServiceType::Sonarr => {
            serde_json::to_value(sonarr::overview(upstream, instance, profile, options).await?)?
        }
        ServiceType::Radarr => {
            serde_json::to_value(radarr::overview(upstream, instance, profile, options).await?)?
        }
        ServiceType::Prowlarr => {
            serde_json::to_value(prowlarr::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Plex => serde_json::to_value(plex::overview(upstream, instance, profile).await?)?,
        ServiceType::Tautulli => {
            serde_json::to_value(tautulli::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Sabnzbd => {
            serde_json::to_value(sabnzbd::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Qbittorrent => {
            serde_json::to_value(qbittorrent::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Overseerr | ServiceType::Jellyseerr => {
            serde_json::to_value(seerr::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Jellyfin => {
            serde_json::to_value(jellyfin::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Bazarr => {
            serde_json::to_value(bazarr::overview(upstream, instance, profile).await?)?
        }
        ServiceType::Unifi => serde_json::to_value(unifi::overview(upstream, instance, profile).await?)?,
    };
    Ok(doc)
}

/// Deserializes `null` as `T::default()`. Pair with `#[serde(default)]` so
/// absent fields behave the same way.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a number, a numeric string, or null (as 0). Some services report
/// counters as strings.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    })
}

/// Float counterpart of [`lenient_i64`].
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}
