use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use sysinfo::System;

use crate::models::Profile;
use crate::state::AppState;

const MEMORY_WARN_PERCENT: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct Check {
    pub status: CheckStatus,
    pub message: String,
}

impl Check {
    fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Checks {
    pub database: Check,
    pub filesystem: Check,
    pub memory: Check,
    pub configuration: Check,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub checks: Checks,
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let checks = Checks {
        database: database_check(&state).await,
        filesystem: filesystem_check(&state.config.database_path).await,
        memory: memory_check(),
        configuration: configuration_check(&state).await,
    };

    let worst = [
        checks.database.status,
        checks.filesystem.status,
        checks.memory.status,
        checks.configuration.status,
    ]
    .into_iter()
    .max()
    .unwrap_or(CheckStatus::Ok);

    let (code, status) = match worst {
        CheckStatus::Ok => (StatusCode::OK, "healthy"),
        CheckStatus::Warning => (StatusCode::OK, "degraded"),
        CheckStatus::Error => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };
    if worst == CheckStatus::Error {
        tracing::warn!(?checks, "health check failed");
    }

    (
        code,
        Json(HealthReport {
            status,
            timestamp: Utc::now(),
            checks,
        }),
    )
}

async fn database_check(state: &AppState) -> Check {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => Check::new(CheckStatus::Ok, "database reachable"),
        Err(e) => Check::new(CheckStatus::Error, format!("database query failed: {e}")),
    }
}

/// The data directory must accept writes for saves and logs to work.
async fn filesystem_check(database_path: &str) -> Check {
    if database_path.starts_with(":memory:") || database_path.starts_with("sqlite::memory:") {
        return Check::new(CheckStatus::Ok, "in-memory database");
    }
    let dir = Path::new(database_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let probe = dir.join(".health-probe");
    match tokio::fs::write(&probe, b"ok").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            Check::new(CheckStatus::Ok, format!("{} is writable", dir.display()))
        }
        Err(e) => Check::new(
            CheckStatus::Error,
            format!("{} is not writable: {e}", dir.display()),
        ),
    }
}

fn memory_check() -> Check {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return Check::new(CheckStatus::Warning, "memory usage unavailable");
    }
    let percent = sys.used_memory() as f64 / total as f64 * 100.0;
    let status = if percent >= MEMORY_WARN_PERCENT {
        CheckStatus::Warning
    } else {
        CheckStatus::Ok
    };
    Check::new(status, format!("{percent:.1}% of system memory in use"))
}

async fn configuration_check(state: &AppState) -> Check {
    let instances = match state.instances.get_all().await {
        Ok(instances) => instances,
        Err(e) => return Check::new(CheckStatus::Error, format!("instance store unreadable: {e}")),
    };
    let usable = instances
        .values()
        .filter(|i| i.enabled)
        .filter(|i| {
            let profile = Profile::resolve(i, state.env.as_ref());
            !profile.url.is_empty() && profile.credentials.missing_for(i.service_type).is_none()
        })
        .count();
    if usable == 0 {
        Check::new(CheckStatus::Warning, "no service instances configured")
    } else {
        Check::new(CheckStatus::Ok, format!("{usable} service instance(s) configured"))
    }
}
