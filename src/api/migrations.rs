//! VDC migration lifecycle endpoints

use axum::extract::State;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use crate::api::AppState;
use crate::domain::migration::{RollbackRequest, StartMigrationRequest, VdcMigrationState};
use crate::error::ApiError;

/// `GET /migrations/status`
pub async fn status(State(state): State<Arc<AppState>>) -> Json<VdcMigrationState> {
    Json(state.lifecycle.status().await)
}

/// `GET /migrations/snapshots`
pub async fn snapshots(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshots = state.lifecycle.list_snapshots().await?;
    Ok(Json(json!({
        "count": snapshots.len(),
        "snapshots": snapshots,
    })))
}

/// `POST /migrations/start`
///
/// Returns as soon as the run is scheduled; progress and failures are
/// observed through the status endpoint.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartMigrationRequest>,
) -> Result<Json<VdcMigrationState>, ApiError> {
    if body.target_version.is_empty() {
        return Err(ApiError::bad_request("target_version must not be empty"));
    }
    Ok(Json(state.lifecycle.start(body).await?))
}

/// `POST /migrations/snapshot`
pub async fn snapshot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = state.lifecycle.create_snapshot().await?;
    Ok(Json(json!({
        "status": "created",
        "path": path,
    })))
}

/// `POST /migrations/rollback`
pub async fn rollback(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RollbackRequest>>,
) -> Result<Json<VdcMigrationState>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(state.lifecycle.rollback(request).await?))
}
