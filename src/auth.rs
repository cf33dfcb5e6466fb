use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

/// Guards the admin surface. Open when no admin token is configured.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if presented != Some(expected) {
        tracing::warn!(path = %request.uri().path(), "rejected unauthenticated admin request");
        return Err(ApiError::AuthenticationRequired);
    }
    Ok(next.run(request).await)
}
