use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::probe::{self, ProbeResult};
use crate::db::{self, AuditLog};
use crate::error::{ApiError, StoreError};
use crate::models::{InstanceInput, Profile, ServiceInstance};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::routes::parse_service;
use crate::settings::DashboardSettings;
use crate::state::AppState;

const AUDIT_LIMIT: i64 = 100;

#[derive(Serialize)]
pub struct AdminInstances {
    pub instances: BTreeMap<String, ServiceInstance>,
}

#[derive(Serialize)]
pub struct AdminInstance {
    pub instance: ServiceInstance,
}

pub async fn list_instances(
    State(state): State<Arc<AppState>>,
    ApiPath(service): ApiPath<String>,
) -> Result<Json<AdminInstances>, ApiError> {
    let service_type = parse_service(&service)?;
    let instances = state.instances.get_all_by_type(service_type).await?;
    Ok(Json(AdminInstances { instances }))
}

pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    ApiPath(service): ApiPath<String>,
    ApiJson(input): ApiJson<InstanceInput>,
) -> Result<(StatusCode, Json<AdminInstance>), ApiError> {
    let service_type = parse_service(&service)?;
    let id = state.instances.next_id(service_type).await?;
    let instance = state
        .instances
        .save(&id, input.into_instance(id.clone(), service_type))
        .await?;
    db::log_event(&state.db, service_type.as_str(), "Instance Created", &audit_detail(&instance)).await;
    Ok((StatusCode::CREATED, Json(AdminInstance { instance })))
}

pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    ApiPath((service, id)): ApiPath<(String, String)>,
) -> Result<Json<AdminInstance>, ApiError> {
    let service_type = parse_service(&service)?;
    let instance = state
        .instances
        .get(&id)
        .await?
        .filter(|i| i.service_type == service_type)
        .ok_or_else(|| ApiError::NotFound(format!("instance '{id}' not found")))?;
    Ok(Json(AdminInstance { instance }))
}

pub async fn save_instance(
    State(state): State<Arc<AppState>>,
    ApiPath((service, id)): ApiPath<(String, String)>,
    ApiJson(input): ApiJson<InstanceInput>,
) -> Result<Json<AdminInstance>, ApiError> {
    let service_type = parse_service(&service)?;
    if let Some(existing) = state.instances.get(&id).await? {
        if existing.service_type != service_type {
            return Err(ApiError::Validation(format!(
                "instance '{id}' is a {} instance",
                existing.service_type
            )));
        }
    }
    let instance = state
        .instances
        .save(&id, input.into_instance(id.clone(), service_type))
        .await?;
    db::log_event(&state.db, service_type.as_str(), "Instance Saved", &audit_detail(&instance)).await;
    Ok(Json(AdminInstance { instance }))
}

pub async fn delete_instance(
    State(state): State<Arc<AppState>>,
    ApiPath((service, id)): ApiPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let service_type = parse_service(&service)?;
    // Absent ids stay idempotent; an id owned by another type is not ours to delete.
    if let Some(existing) = state.instances.get(&id).await? {
        if existing.service_type != service_type {
            return Err(ApiError::NotFound(format!("instance '{id}' not found")));
        }
    }
    state.instances.delete(&id).await?;
    db::log_event(&state.db, service_type.as_str(), "Instance Deleted", &id).await;
    Ok(Json(json!({ "success": true })))
}

/// Probes the posted connection details. Blank fields fall back to the
/// environment just like stored instances do.
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    ApiPath(service): ApiPath<String>,
    ApiJson(input): ApiJson<InstanceInput>,
) -> Result<Json<ProbeResult>, ApiError> {
    let service_type = parse_service(&service)?;
    let candidate = input.into_instance(String::new(), service_type);
    let profile = Profile::resolve(&candidate, state.env.as_ref());
    let result = probe::test_connection(
        &state.upstream,
        service_type,
        &profile,
        probe::time_limit(state.config.upstream_timeout),
    )
    .await;
    tracing::info!(service = %service_type, success = result.success, "connection test");
    Ok(Json(result))
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSettings>, ApiError> {
    Ok(Json(state.settings.get().await.map_err(StoreError::from)?))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(settings): ApiJson<DashboardSettings>,
) -> Result<Json<DashboardSettings>, ApiError> {
    if !(5..=3600).contains(&settings.refresh_interval_secs) {
        return Err(ApiError::Validation(
            "refreshIntervalSecs must be between 5 and 3600".into(),
        ));
    }
    state.settings.update(&settings).await.map_err(StoreError::from)?;
    db::log_event(&state.db, "System", "Settings Updated", "dashboard settings changed").await;
    Ok(Json(settings))
}

pub async fn audit_log(State(state): State<Arc<AppState>>) -> Result<Json<Vec<AuditLog>>, ApiError> {
    let events = db::recent_events(&state.db, AUDIT_LIMIT)
        .await
        .map_err(StoreError::from)?;
    Ok(Json(events))
}

fn audit_detail(instance: &ServiceInstance) -> String {
    format!("{} ({})", instance.id, instance.display_name)
}
