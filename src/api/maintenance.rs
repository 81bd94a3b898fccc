//! Maintenance coordination endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use crate::api::AppState;
use crate::domain::maintenance::{
    CompleteReport, DrainProgress, MaintenanceRequest, MaintenanceResponse,
};
use crate::error::ApiError;

/// `POST /maintenance/request`
pub async fn request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MaintenanceRequest>,
) -> Result<Json<MaintenanceResponse>, ApiError> {
    if body.node_id.is_empty() {
        return Err(ApiError::bad_request("node_id must not be empty"));
    }
    Ok(Json(state.coordinator.request(body).await))
}

/// `GET /maintenance/status/{node_id}`
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<MaintenanceResponse>, ApiError> {
    Ok(Json(state.coordinator.status(&node_id).await?))
}

/// `GET /maintenance/list`
pub async fn list(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let nodes = state.coordinator.list().await;
    Json(json!({
        "count": nodes.len(),
        "nodes": nodes,
    }))
}

/// `POST /maintenance/drain-progress`
pub async fn drain_progress(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DrainProgress>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let node_state = state.coordinator.drain_progress(body).await?;
    Ok(Json(json!({
        "status": "ok",
        "state": node_state,
    })))
}

/// `POST /maintenance/complete`
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CompleteReport>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let response = state.coordinator.complete(body).await?;
    Ok(Json(json!({
        "status": "ok",
        "state": response.state,
    })))
}

/// `POST /maintenance/cancel/{node_id}`
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> Result<Json<MaintenanceResponse>, ApiError> {
    Ok(Json(state.coordinator.cancel(&node_id).await?))
}
