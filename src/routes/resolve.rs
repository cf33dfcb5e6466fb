//! Turns `?instance=<id>` into a resolved connection profile before any
//! service handler runs.

use axum::extract::{FromRequestParts, Query, RawPathParams};
use axum::http::request::Parts;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ApiError, ServiceError};
use crate::models::{Profile, ServiceType};
use crate::state::AppState;

/// A configured, enabled instance ready to be handed to a service client.
///
/// Rejections: unknown `:service` path segment (404), missing `instance`
/// query parameter (400), and an instance that is absent, disabled, of another
/// type, or has no url after env fallback (503).
#[derive(Debug, Clone)]
pub struct InstanceContext {
    pub id: String,
    pub service_type: ServiceType,
    pub profile: Profile,
    pub query: HashMap<String, String>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for InstanceContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = match RawPathParams::from_request_parts(parts, state).await {
            Ok(params) => params
                .iter()
                .find(|(name, _)| *name == "service")
                .map(|(_, value)| value.parse::<ServiceType>())
                .transpose()
                .map_err(ApiError::UnknownServiceType)?,
            Err(_) => None,
        };

        let query = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map(|Query(q)| q)
            .unwrap_or_default();

        let id = query
            .get("instance")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::MissingInstanceId)?
            .to_string();

        let instance = state
            .instances
            .get(&id)
            .await?
            .filter(|i| i.enabled)
            .filter(|i| expected.map_or(true, |t| t == i.service_type))
            .ok_or_else(|| ApiError::InstanceNotConfigured(id.clone()))?;

        let profile = Profile::resolve(&instance, state.env.as_ref());
        if profile.url.is_empty() {
            return Err(ApiError::InstanceNotConfigured(id));
        }

        Ok(Self {
            id,
            service_type: instance.service_type,
            profile,
            query,
        })
    }
}

impl InstanceContext {
    /// Routes with a fixed service in the path check the type here.
    pub fn require(&self, expected: ServiceType) -> Result<(), ApiError> {
        if self.service_type == expected {
            Ok(())
        } else {
            Err(ApiError::InstanceNotConfigured(self.id.clone()))
        }
    }

    /// Maps a handler failure onto the HTTP error taxonomy. Unexpected failures
    /// are logged here and reach the client only as a generic 500.
    pub fn finish<T>(&self, result: Result<T, ServiceError>) -> Result<T, ApiError> {
        result.map_err(|e| match e {
            ServiceError::MissingCredentials(missing) => {
                tracing::warn!(instance = %self.id, service = %self.service_type, missing, "missing credentials");
                ApiError::MissingCredentials {
                    id: self.id.clone(),
                    missing,
                }
            }
            ServiceError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            other => {
                tracing::error!(instance = %self.id, service = %self.service_type, error = %other, "handler failed");
                ApiError::Internal
            }
        })
    }
}
