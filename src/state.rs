use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::{AppConfig, EnvSource};
use crate::db::InstanceStore;
use crate::settings::SettingsCache;
use crate::upstream::Upstream;

pub struct AppState {
    pub config: AppConfig,
    pub db: SqlitePool,
    pub instances: InstanceStore,
    pub settings: SettingsCache,
    pub upstream: Upstream,
    /// Fallback layer for instance fields left blank in the store.
    pub env: Arc<dyn EnvSource>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: SqlitePool,
        upstream: Upstream,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            instances: InstanceStore::new(db.clone()),
            settings: SettingsCache::new(db.clone()),
            config,
            db,
            upstream,
            env,
        }
    }
}

#[cfg(test)]
pub async fn test_state(
    upstream: Upstream,
    config: AppConfig,
    env: std::collections::HashMap<String, String>,
) -> Arc<AppState> {
    let db = crate::db::init_memory_db().await;
    Arc::new(AppState::new(config, db, upstream, Arc::new(env)))
}
