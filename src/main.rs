use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod settings;
mod state;
mod upstream;

use config::{AppConfig, ProcessEnv};
use state::AppState;
use upstream::{ReqwestTransport, Upstream};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    if let Some(parent) = config.log_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("opening log file {}", config.log_file.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dasharr=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();

    tracing::info!(port = config.port, database = %config.database_path, "starting dasharr");

    let db = db::init_db(&config.database_path)
        .await
        .with_context(|| format!("opening database {}", config.database_path))?;

    let transport = ReqwestTransport::new(config.upstream_timeout)?;
    if config.admin_token.is_none() {
        tracing::warn!("DASHARR_ADMIN_TOKEN is not set, admin endpoints are unauthenticated");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(
        config,
        db,
        Upstream::new(Arc::new(transport)),
        Arc::new(ProcessEnv),
    ));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
