use axum::extract::State;
use axum::Json;
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::db::InstanceStore;
use crate::error::{ApiError, StoreError};
use crate::models::{PublicInstance, ServiceType};
use crate::routes::extract::ApiPath;
use crate::routes::parse_service;
use crate::state::AppState;

/// Serializes as a JSON object keyed by id, keeping list order.
pub struct InstanceMap(pub Vec<PublicInstance>);

impl Serialize for InstanceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|i| (&i.id, i)))
    }
}

#[derive(Serialize)]
pub struct InstancesBody {
    pub instances: InstanceMap,
}

#[derive(Serialize)]
pub struct InstanceBody {
    pub instance: PublicInstance,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    pub refresh_interval_secs: u32,
}

/// Enabled instances, credential-free, sorted by (order, id).
pub async fn list_public_instances(store: &InstanceStore) -> Result<Vec<PublicInstance>, StoreError> {
    Ok(store
        .list_ordered()
        .await?
        .into_iter()
        .filter(|i| i.enabled)
        .map(|i| i.to_public())
        .collect())
}

/// `None` when the instance is absent, disabled or of another type.
pub async fn get_public_instance(
    store: &InstanceStore,
    service_type: ServiceType,
    id: &str,
) -> Result<Option<PublicInstance>, StoreError> {
    Ok(store
        .get(id)
        .await?
        .filter(|i| i.enabled && i.service_type == service_type)
        .map(|i| i.to_public()))
}

pub async fn list_instances(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InstancesBody>, ApiError> {
    let instances = list_public_instances(&state.instances).await?;
    Ok(Json(InstancesBody {
        instances: InstanceMap(instances),
    }))
}

pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    ApiPath((service, id)): ApiPath<(String, String)>,
) -> Result<Json<InstanceBody>, ApiError> {
    let service_type = parse_service(&service)?;
    let instance = get_public_instance(&state.instances, service_type, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("instance '{id}' not found")))?;
    Ok(Json(InstanceBody { instance }))
}

pub async fn settings(State(state): State<Arc<AppState>>) -> Result<Json<PublicSettings>, ApiError> {
    let settings = state.settings.get().await.map_err(StoreError::from)?;
    Ok(Json(PublicSettings {
        refresh_interval_secs: settings.refresh_interval_secs,
    }))
}
