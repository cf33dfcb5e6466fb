pub mod admin;
pub mod extract;
pub mod health;
pub mod public;
pub mod resolve;
pub mod services;

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::models::ServiceType;
use crate::state::AppState;

pub(crate) fn parse_service(raw: &str) -> Result<ServiceType, ApiError> {
    raw.parse().map_err(ApiError::UnknownServiceType)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> axum::response::Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    ApiError::Internal.into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/api/admin/instances/:service",
            get(admin::list_instances).post(admin::create_instance),
        )
        .route(
            "/api/admin/instances/:service/:id",
            get(admin::get_instance)
                .post(admin::save_instance)
                .delete(admin::delete_instance),
        )
        .route("/api/admin/:service/test", post(admin::test_connection))
        .route(
            "/api/admin/settings",
            get(admin::get_settings).post(admin::update_settings),
        )
        .route("/api/admin/audit", get(admin::audit_log))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/api/services/:service/overview", get(services::overview))
        .route(
            "/api/services/sonarr/series/:series_id",
            get(services::sonarr_series),
        )
        .route(
            "/api/services/radarr/movies/:movie_id",
            get(services::radarr_movie),
        )
        .route("/api/public/instances", get(public::list_instances))
        .route(
            "/api/public/instances/:service/:id",
            get(public::get_instance),
        )
        .route("/api/public/settings", get(public::settings))
        .route("/api/health", get(health::health))
        .merge(admin)
        .fallback_service(ServeDir::new(&state.config.static_dir))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
