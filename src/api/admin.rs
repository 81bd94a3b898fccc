//! Health probe and admin endpoints

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::AppState;
use crate::domain::product::Product;
use crate::error::ApiError;
use crate::signing;

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /admin/public-key`
pub async fn public_key(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let public_key = state.signing.public_key_b64()?;
    Ok(Json(json!({
        "public_key": public_key,
        "key_id": state.signing.key_id(),
        "algorithm": signing::ALGORITHM,
    })))
}

/// `GET /admin/status`
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut products = serde_json::Map::new();
    for product in Product::all() {
        let releases = state.registry.list_releases(product, None).await?;
        products.insert(
            product.as_str().to_string(),
            json!({ "release_count": releases.len() }),
        );
    }

    Ok(Json(json!({
        "service": "quantix-release-agent",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "signing_enabled": state.signing.enabled(),
        "control_plane_configured": state.config.control_plane_configured(),
        "migration_phase": state.lifecycle.status().await.phase,
        "products": products,
    })))
}

/// `GET /admin/config`
pub async fn config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.config.sanitized())
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateKeysRequest {
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// `POST /admin/generate-keys`
///
/// Writes a fresh keypair to disk and returns the paths. The server keeps
/// using the key it loaded at startup; point
/// `SIGNING_PRIVATE_KEY_PATH` at the new file and restart to adopt it.
pub async fn generate_keys(
    State(state): State<Arc<AppState>>,
    body: Option<Json<GenerateKeysRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let output_dir = request
        .output_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| state.config.release_root.join("keys"));

    let generated = signing::generate_keypair(&output_dir)?;

    Ok(Json(json!({
        "status": "generated",
        "private_key_path": generated.private_key_path,
        "public_key_path": generated.public_key_path,
        "public_key": generated.public_key_b64,
        "algorithm": signing::ALGORITHM,
    })))
}
