use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use crate::api::{self, OverviewOptions};
use crate::error::ApiError;
use crate::models::ServiceType;
use crate::routes::extract::ApiPath;
use crate::routes::resolve::InstanceContext;
use crate::state::AppState;

const MAX_CALENDAR_DAYS: i64 = 90;

fn fresh(body: impl serde::Serialize) -> Response {
    ([(CACHE_CONTROL, "no-store")], Json(body)).into_response()
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    ctx: InstanceContext,
) -> Result<Response, ApiError> {
    let options = OverviewOptions {
        calendar_days: ctx
            .query
            .get("days")
            .and_then(|d| d.parse().ok())
            .filter(|d| (1..=MAX_CALENDAR_DAYS).contains(d))
            .unwrap_or(OverviewOptions::default().calendar_days),
    };

    let doc = ctx.finish(
        api::overview(&state.upstream, ctx.service_type, &ctx.id, &ctx.profile, &options).await,
    )?;
    Ok(fresh(doc))
}

pub async fn sonarr_series(
    State(state): State<Arc<AppState>>,
    ApiPath(series_id): ApiPath<i64>,
    ctx: InstanceContext,
) -> Result<Response, ApiError> {
    ctx.require(ServiceType::Sonarr)?;
    let detail = ctx.finish(
        api::sonarr::series_detail(&state.upstream, &ctx.id, &ctx.profile, series_id).await,
    )?;
    Ok(fresh(detail))
}

pub async fn radarr_movie(
    State(state): State<Arc<AppState>>,
    ApiPath(movie_id): ApiPath<i64>,
    ctx: InstanceContext,
) -> Result<Response, ApiError> {
    ctx.require(ServiceType::Radarr)?;
    let detail = ctx.finish(
        api::radarr::movie_detail(&state.upstream, &ctx.id, &ctx.profile, movie_id).await,
    )?;
    Ok(fresh(detail))
}
