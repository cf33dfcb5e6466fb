use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::upstream::UpstreamError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Errors that reach the HTTP client.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("missing required query parameter 'instance'")]
    MissingInstanceId,

    #[error("instance '{0}' is not configured")]
    InstanceNotConfigured(String),

    #[error("instance '{id}' is missing credential '{missing}'")]
    MissingCredentials { id: String, missing: &'static str },

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("unknown service type '{0}'")]
    UnknownServiceType(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingInstanceId => "MissingInstanceId",
            ApiError::InstanceNotConfigured(_) => "InstanceNotConfigured",
            ApiError::MissingCredentials { .. } => "MissingCredentials",
            ApiError::AuthenticationRequired => "AuthenticationRequired",
            ApiError::UnknownServiceType(_) => "UnknownServiceType",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Validation(_) => "ValidationError",
            ApiError::Internal => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingInstanceId | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InstanceNotConfigured(_) | ApiError::MissingCredentials { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::UnknownServiceType(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Instance store failures.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record '{id}': {reason}")]
    Corrupt { id: String, reason: String },
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => ApiError::Validation(msg),
            other => {
                tracing::error!(error = %other, "instance store failure");
                ApiError::Internal
            }
        }
    }
}

/// Failures raised by an aggregation or detail handler as a whole.
/// Individual upstream calls inside a batch never surface here.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("missing credential '{0}'")]
    MissingCredentials(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_taxonomy() {
        assert_eq!(ApiError::MissingInstanceId.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InstanceNotConfigured("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::MissingCredentials { id: "x".into(), missing: "apiKey" }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::AuthenticationRequired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_error_message_is_generic() {
        assert_eq!(ApiError::Internal.to_string(), "internal error");
        let api: ApiError = StoreError::Corrupt {
            id: "sonarr1".into(),
            reason: "bad type".into(),
        }
        .into();
        assert_eq!(api.kind(), "InternalError");
    }
}
