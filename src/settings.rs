use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db;

const REFRESH_INTERVAL: &str = "refresh_interval_secs";
const TRUST_PROXY: &str = "trust_proxy";
const METRICS_PUSH_URL: &str = "metrics_push_url";
const METRICS_PUSH_ENABLED: &str = "metrics_push_enabled";

/// Process-wide dashboard settings. Only the UI polling cadence depends on
/// these; instance resolution never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    pub refresh_interval_secs: u32,
    pub trust_proxy: bool,
    pub metrics_push_url: Option<String>,
    pub metrics_push_enabled: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            trust_proxy: false,
            metrics_push_url: None,
            metrics_push_enabled: false,
        }
    }
}

impl DashboardSettings {
    async fn load(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let defaults = Self::default();
        Ok(Self {
            refresh_interval_secs: db::get_setting(pool, REFRESH_INTERVAL)
                .await?
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_interval_secs),
            trust_proxy: db::get_setting(pool, TRUST_PROXY)
                .await?
                .map(|v| v == "true")
                .unwrap_or(defaults.trust_proxy),
            metrics_push_url: db::get_setting(pool, METRICS_PUSH_URL)
                .await?
                .filter(|v| !v.is_empty()),
            metrics_push_enabled: db::get_setting(pool, METRICS_PUSH_ENABLED)
                .await?
                .map(|v| v == "true")
                .unwrap_or(defaults.metrics_push_enabled),
        })
    }

    async fn store(&self, pool: &SqlitePool) -> Result<(), sqlx::Error> {
        db::set_setting(pool, REFRESH_INTERVAL, &self.refresh_interval_secs.to_string()).await?;
        db::set_setting(pool, TRUST_PROXY, &self.trust_proxy.to_string()).await?;
        db::set_setting(
            pool,
            METRICS_PUSH_URL,
            self.metrics_push_url.as_deref().unwrap_or(""),
        )
        .await?;
        db::set_setting(pool, METRICS_PUSH_ENABLED, &self.metrics_push_enabled.to_string()).await?;
        Ok(())
    }
}

/// Read-through cache over the settings table with an explicit invalidation hook.
#[derive(Clone)]
pub struct SettingsCache {
    pool: SqlitePool,
    cached: Arc<RwLock<Option<DashboardSettings>>>,
}

impl SettingsCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get(&self) -> Result<DashboardSettings, sqlx::Error> {
        if let Some(settings) = self.cached.read().await.as_ref() {
            return Ok(settings.clone());
        }
        let mut slot = self.cached.write().await;
        if let Some(settings) = slot.as_ref() {
            return Ok(settings.clone());
        }
        let settings = DashboardSettings::load(&self.pool).await?;
        *slot = Some(settings.clone());
        Ok(settings)
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Persists `settings` and drops the cached copy.
    pub async fn update(&self, settings: &DashboardSettings) -> Result<(), sqlx::Error> {
        settings.store(&self.pool).await?;
        self.invalidate().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    #[tokio::test]
    async fn defaults_when_table_is_empty() {
        let cache = SettingsCache::new(init_memory_db().await);
        assert_eq!(cache.get().await.unwrap(), DashboardSettings::default());
    }

    #[tokio::test]
    async fn cached_value_survives_until_invalidated() {
        let pool = init_memory_db().await;
        let cache = SettingsCache::new(pool.clone());
        assert_eq!(cache.get().await.unwrap().refresh_interval_secs, 30);

        db::set_setting(&pool, REFRESH_INTERVAL, "5").await.unwrap();
        assert_eq!(cache.get().await.unwrap().refresh_interval_secs, 30);

        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap().refresh_interval_secs, 5);
    }

    #[tokio::test]
    async fn update_persists_and_refreshes() {
        let cache = SettingsCache::new(init_memory_db().await);
        cache.get().await.unwrap();
        let new = DashboardSettings {
            refresh_interval_secs: 60,
            trust_proxy: true,
            metrics_push_url: Some("http://push:9091".into()),
            metrics_push_enabled: true,
        };
        cache.update(&new).await.unwrap();
        assert_eq!(cache.get().await.unwrap(), new);
    }
}
