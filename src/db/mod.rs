use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

pub mod instances;

pub use instances::InstanceStore;

pub async fn init_db(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
    }

    let opts = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    create_tables(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database; every connection to `:memory:` is a
/// separate database, so the pool must never open a second one.
#[cfg(test)]
pub async fn init_memory_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    create_tables(&pool).await.expect("schema");
    pool
}

async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS service_instances (
            id TEXT PRIMARY KEY,
            service_type TEXT NOT NULL,
            display_name TEXT NOT NULL,
            url TEXT,
            api_key TEXT,
            token TEXT,
            username TEXT,
            password TEXT,
            api_key1 TEXT,
            api_key2 TEXT,
            api_key3 TEXT,
            api_key4 TEXT,
            api_key5 TEXT,
            site_manager_api_key TEXT,
            enabled BOOLEAN NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0,
            last_saved TEXT NOT NULL
        );",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
            service TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT NOT NULL
        );",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dashboard_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR REPLACE INTO dashboard_settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM dashboard_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub timestamp: String,
    pub service: String,
    pub action: String,
    pub details: String,
}

/// Best-effort audit trail; a failed insert is logged, never surfaced.
pub async fn log_event(pool: &SqlitePool, service: &str, action: &str, details: &str) {
    let res = sqlx::query("INSERT INTO audit_logs (service, action, details) VALUES (?, ?, ?)")
        .bind(service)
        .bind(action)
        .bind(details)
        .execute(pool)
        .await;
    if let Err(e) = res {
        tracing::warn!(service, action, error = %e, "failed to write audit log");
    }
}

pub async fn recent_events(pool: &SqlitePool, limit: i64) -> Result<Vec<AuditLog>, sqlx::Error> {
    sqlx::query_as::<_, AuditLog>(
        "SELECT id, CAST(timestamp AS TEXT) AS timestamp, service, action, details
         FROM audit_logs ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_round_trip_and_overwrite() {
        let pool = init_memory_db().await;
        assert_eq!(get_setting(&pool, "refresh_interval_secs").await.unwrap(), None);
        set_setting(&pool, "refresh_interval_secs", "15").await.unwrap();
        set_setting(&pool, "refresh_interval_secs", "45").await.unwrap();
        assert_eq!(
            get_setting(&pool, "refresh_interval_secs").await.unwrap().as_deref(),
            Some("45")
        );
    }

    #[tokio::test]
    async fn audit_events_are_listed_newest_first() {
        let pool = init_memory_db().await;
        log_event(&pool, "sonarr", "Instance Saved", "sonarr1").await;
        log_event(&pool, "sonarr", "Instance Deleted", "sonarr1").await;
        let events = recent_events(&pool, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "Instance Deleted");
        assert!(!events[0].timestamp.is_empty());
    }
}
