//! Bearer-token auth for mutating and admin endpoints
//!
//! A single static token from configuration. Read endpoints (manifests,
//! artifacts, status polls) stay open for update agents; everything that
//! mutates requires `Authorization: Bearer <token>`. An empty configured
//! token locks the mutating surface entirely.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::api::AppState;
use crate::error::ApiError;

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = &state.config.publish_token;
    if token.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    let authorized = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|presented| presented == token)
        .unwrap_or(false);

    if !authorized {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
