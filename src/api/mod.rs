//! HTTP surface
//!
//! A conventional REST facade under `/api/v1`. The composition root
//! (`AppState::from_config`) builds the registry, signing service,
//! maintenance coordinator, and migration lifecycle once at startup and
//! hands the router shared handles; tests construct isolated states the
//! same way.

pub mod admin;
pub mod auth;
pub mod maintenance;
pub mod migrations;
pub mod releases;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ServerConfig, MAX_BODY_BYTES};
use crate::coordinator::MaintenanceCoordinator;
use crate::infrastructure::control_plane::ControlPlaneClient;
use crate::lifecycle::MigrationLifecycle;
use crate::registry::ReleaseRegistry;
use crate::signing::SigningService;
use crate::store::ArtifactStore;

/// Everything the handlers share.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: ReleaseRegistry,
    pub signing: SigningService,
    pub coordinator: Arc<MaintenanceCoordinator>,
    pub lifecycle: Arc<MigrationLifecycle>,
    pub started_at: Instant,
}

impl AppState {
    /// Construct all subsystems from configuration.
    pub async fn from_config(config: ServerConfig) -> Result<Arc<Self>> {
        let store = ArtifactStore::new(&config.release_root);
        store.init().await.context("initializing release root")?;
        let registry = ReleaseRegistry::new(store);

        let signing = SigningService::init(
            config.signing_private_key_path.as_deref(),
            &config.signing_key_id,
        )
        .context("loading signing key")?;

        let control_plane = ControlPlaneClient::from_config(config.control_plane_url.as_deref());
        let drain_callback_url = format!(
            "http://{}/api/v1/maintenance/drain-progress",
            config.listen_address
        );
        let coordinator = Arc::new(MaintenanceCoordinator::new(
            control_plane,
            drain_callback_url,
        ));

        let lifecycle = Arc::new(MigrationLifecycle::new(&config));

        Ok(Arc::new(Self {
            config,
            registry,
            signing,
            coordinator,
            lifecycle,
            started_at: Instant::now(),
        }))
    }
}

/// Build the full route table.
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/channels", get(releases::channels))
        .route("/maintenance/status/:node_id", get(maintenance::status))
        .route("/maintenance/list", get(maintenance::list))
        .route("/migrations/status", get(migrations::status))
        .route("/migrations/snapshots", get(migrations::snapshots))
        .route("/admin/public-key", get(admin::public_key))
        .route("/admin/status", get(admin::status))
        .route("/admin/config", get(admin::config))
        .route("/:product/manifest", get(releases::latest_manifest))
        .route("/:product/manifest/signed", get(releases::signed_manifest))
        .route("/:product/releases", get(releases::list))
        .route(
            "/:product/releases/:version/manifest",
            get(releases::manifest),
        )
        .route(
            "/:product/releases/:version/:artifact",
            get(releases::download),
        );

    let protected = Router::new()
        .route("/:product/publish", post(releases::publish))
        .route("/:product/releases/:version", delete(releases::delete))
        .route("/maintenance/request", post(maintenance::request))
        .route(
            "/maintenance/drain-progress",
            post(maintenance::drain_progress),
        )
        .route("/maintenance/complete", post(maintenance::complete))
        .route("/maintenance/cancel/:node_id", post(maintenance::cancel))
        .route("/migrations/start", post(migrations::start))
        .route("/migrations/snapshot", post(migrations::snapshot))
        .route("/migrations/rollback", post(migrations::rollback))
        .route("/admin/generate-keys", post(admin::generate_keys))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let mut app = Router::new()
        .nest("/api/v1", public.merge(protected))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    if let Some(ui_path) = &state.config.ui_static_path {
        app = app.fallback_service(ServeDir::new(ui_path));
    }

    app
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&state.config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", state.config.listen_address))?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "release agent listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use tower::ServiceExt;

    use crate::domain::manifest::SignedManifest;
    use crate::signing;

    const TOKEN: &str = "test-token";
    const BOUNDARY: &str = "qx-test-boundary";

    async fn test_state(dir: &std::path::Path, with_signing: bool) -> Arc<AppState> {
        let signing_key = if with_signing {
            let generated = signing::generate_keypair(&dir.join("keys")).unwrap();
            Some(generated.private_key_path)
        } else {
            None
        };

        let config = ServerConfig {
            release_root: dir.join("releases"),
            snapshot_dir: dir.join("snapshots"),
            migrations_dir: dir.join("migrations"),
            database_url: dir.join("vdc.db").display().to_string(),
            publish_token: TOKEN.to_string(),
            signing_private_key_path: signing_key,
            ..ServerConfig::default()
        };
        AppState::from_config(config).await.unwrap()
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            let disposition = match filename {
                Some(filename) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                    name, filename
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn publish_request(product: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/{}/publish", product))
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn authed(request: Request<Body>) -> Request<Body> {
        let (mut parts, body) = request.into_parts();
        parts.headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", TOKEN).parse().unwrap(),
        );
        Request::from_parts(parts, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(state, request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn sample_manifest(version: &str, payload: &[u8]) -> String {
        let sha256 = format!("{:x}", Sha256::digest(payload));
        json!({
            "product": "quantix-os",
            "version": version,
            "channel": "dev",
            "release_date": "2026-01-01T00:00:00Z",
            "update_type": "component",
            "components": [{
                "name": "qx-node",
                "artifact": "qx-node.tar.zst",
                "sha256": sha256,
                "size_bytes": payload.len(),
                "install_path": "/data/bin/qx-node"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;
        let (status, body) = send_json(&state, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_channels() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;
        let (status, body) = send_json(&state, get("/api/v1/channels")).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["dev", "beta", "stable"]);
    }

    // S1: fresh publish and fetch.
    #[tokio::test]
    async fn test_publish_and_fetch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let payload = [7u8; 42];
        let manifest = sample_manifest("0.0.5", &payload);

        let (status, body) = send_json(
            &state,
            publish_request(
                "quantix-os",
                &[
                    ("manifest", Some("manifest.json"), manifest.as_bytes()),
                    ("qx-node", Some("qx-node.tar.zst"), &payload),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "body: {}", body);
        assert_eq!(body["artifacts"], json!(["manifest.json", "qx-node.tar.zst"]));
        assert_eq!(body["channel"], "dev");

        // The stored manifest is byte-equal to the upload.
        let (status, bytes) = send(&state, get("/api/v1/quantix-os/manifest?channel=dev")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, manifest.as_bytes());

        let (status, bytes) = send(
            &state,
            get("/api/v1/quantix-os/releases/0.0.5/qx-node.tar.zst?channel=dev"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, payload);
    }

    // S2 / B4: hash mismatch unlinks the artifact.
    #[tokio::test]
    async fn test_publish_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let payload = [7u8; 42];
        let manifest = sample_manifest("0.0.5", b"different bytes entirely");

        let (status, body) = send_json(
            &state,
            publish_request(
                "quantix-os",
                &[
                    ("manifest", Some("manifest.json"), manifest.as_bytes()),
                    ("qx-node", Some("qx-node.tar.zst"), &payload),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["expected"].is_string());
        assert!(body["actual"].is_string());
        assert_ne!(body["expected"], body["actual"]);

        let (status, _) = send(
            &state,
            get("/api/v1/quantix-os/releases/0.0.5/qx-node.tar.zst?channel=dev"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // S3 / P3: version ordering in listings.
    #[tokio::test]
    async fn test_release_listing_version_order() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        for version in ["1.0.0", "1.0.10", "1.0.2"] {
            let manifest = sample_manifest(version, b"x");
            let (status, _) = send_json(
                &state,
                publish_request(
                    "quantix-os",
                    &[("manifest", Some("manifest.json"), manifest.as_bytes())],
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) =
            send_json(&state, get("/api/v1/quantix-os/releases?channel=dev")).await;
        assert_eq!(status, StatusCode::OK);
        let versions: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["version"].as_str().unwrap())
            .collect();
        assert_eq!(versions, vec!["1.0.10", "1.0.2", "1.0.0"]);
    }

    // B3: declared component with no uploaded part is skipped, not fatal.
    #[tokio::test]
    async fn test_manifest_only_publish() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let manifest = sample_manifest("0.0.6", b"whatever");
        let (status, body) = send_json(
            &state,
            publish_request(
                "quantix-os",
                &[("manifest", Some("manifest.json"), manifest.as_bytes())],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["artifacts"], json!(["manifest.json"]));
    }

    // B5: manifest product disagreeing with the URL path.
    #[tokio::test]
    async fn test_publish_product_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let manifest = sample_manifest("0.0.5", b"x");
        let (status, _) = send_json(
            &state,
            publish_request(
                "quantix-vdc",
                &[("manifest", Some("manifest.json"), manifest.as_bytes())],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // B1: unknown product is 400, never 404.
    #[tokio::test]
    async fn test_unknown_product_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;
        let (status, _) = send_json(&state, get("/api/v1/quantix-agent/manifest?channel=dev")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/quantix-os/publish")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(&[(
                "manifest",
                Some("manifest.json"),
                b"{}",
            )])))
            .unwrap();
        let (status, _) = send_json(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/quantix-os/publish")
            .header(header::AUTHORIZATION, "Bearer wrong-token")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::empty())
            .unwrap();
        let (status, _) = send_json(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // R2: delete is idempotent at the request level.
    #[tokio::test]
    async fn test_delete_release_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let manifest = sample_manifest("0.0.5", b"x");
        send_json(
            &state,
            publish_request(
                "quantix-os",
                &[("manifest", Some("manifest.json"), manifest.as_bytes())],
            ),
        )
        .await;

        let delete_request = || {
            authed(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/quantix-os/releases/0.0.5?channel=dev")
                    .body(Body::empty())
                    .unwrap(),
            )
        };

        let (status, body) = send_json(&state, delete_request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "deleted");

        let (status, _) = send_json(&state, delete_request()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // S4: component-update maintenance fast path.
    #[tokio::test]
    async fn test_maintenance_component_fast_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let (status, body) = send_json(
            &state,
            authed(post_json(
                "/api/v1/maintenance/request",
                json!({
                    "node_id": "n1",
                    "update_type": "component",
                    "requires_reboot": false
                }),
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approved"], true);
        assert_eq!(body["state"], "ready");
        assert_eq!(body["proceed_now"], true);
    }

    // S5: full-update drain gate.
    #[tokio::test]
    async fn test_maintenance_drain_gate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let (status, body) = send_json(
            &state,
            authed(post_json(
                "/api/v1/maintenance/request",
                json!({
                    "node_id": "n2",
                    "update_type": "full",
                    "requires_reboot": true
                }),
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "draining");
        assert_eq!(body["proceed_now"], false);
        assert_eq!(body["wait_seconds"], 30);

        let (status, body) = send_json(
            &state,
            authed(post_json(
                "/api/v1/maintenance/drain-progress",
                json!({
                    "node_id": "n2",
                    "total_vms": 3,
                    "migrated_vms": 3,
                    "completed": true
                }),
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "ready");

        let (status, body) = send_json(&state, get("/api/v1/maintenance/status/n2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "ready");
        assert_eq!(body["proceed_now"], true);
    }

    #[tokio::test]
    async fn test_maintenance_cancel_conflict_while_updating() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        send_json(
            &state,
            authed(post_json(
                "/api/v1/maintenance/request",
                json!({"node_id": "n3", "update_type": "component"}),
            )),
        )
        .await;
        // Status poll observes ready and starts the update.
        send_json(&state, get("/api/v1/maintenance/status/n3")).await;

        let (status, _) = send_json(
            &state,
            authed(post_json("/api/v1/maintenance/cancel/n3", json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_maintenance_list() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        send_json(
            &state,
            authed(post_json(
                "/api/v1/maintenance/request",
                json!({"node_id": "n4", "update_type": "component"}),
            )),
        )
        .await;

        let (status, body) = send_json(&state, get("/api/v1/maintenance/list")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["nodes"][0]["node_id"], "n4");
    }

    // S6: signed manifest round-trip with local verification.
    #[tokio::test]
    async fn test_signed_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), true).await;

        let manifest = sample_manifest("0.0.5", b"x");
        send_json(
            &state,
            publish_request(
                "quantix-os",
                &[("manifest", Some("manifest.json"), manifest.as_bytes())],
            ),
        )
        .await;

        let (status, key_body) = send_json(&state, get("/api/v1/admin/public-key")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(key_body["algorithm"], "ed25519");
        let public_key = key_body["public_key"].as_str().unwrap().to_string();

        let (status, bytes) =
            send(&state, get("/api/v1/quantix-os/manifest/signed?channel=dev")).await;
        assert_eq!(status, StatusCode::OK);
        let signed: SignedManifest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(signed.manifest.get().as_bytes(), manifest.as_bytes());

        let verified =
            crate::signing::SigningService::verify(&signed, &public_key).unwrap();
        assert_eq!(verified.version, "0.0.5");

        // A single-byte flip of the manifest must fail verification.
        let tampered_json = manifest.replace("0.0.5", "0.0.6");
        let tampered = SignedManifest {
            manifest: serde_json::value::RawValue::from_string(tampered_json).unwrap(),
            signature: signed.signature.clone(),
            key_id: signed.key_id.clone(),
            signed_at: signed.signed_at.clone(),
            algorithm: signed.algorithm.clone(),
        };
        assert!(crate::signing::SigningService::verify(&tampered, &public_key).is_err());
    }

    #[tokio::test]
    async fn test_signed_manifest_disabled_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let manifest = sample_manifest("0.0.5", b"x");
        send_json(
            &state,
            publish_request(
                "quantix-os",
                &[("manifest", Some("manifest.json"), manifest.as_bytes())],
            ),
        )
        .await;

        let (status, _) =
            send_json(&state, get("/api/v1/quantix-os/manifest/signed?channel=dev")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        let (status, _) = send_json(&state, get("/api/v1/admin/public-key")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_migration_status_and_snapshots_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let (status, body) = send_json(&state, get("/api/v1/migrations/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "none");
        assert_eq!(body["can_rollback"], false);

        let (status, body) = send_json(&state, get("/api/v1/migrations/snapshots")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn test_manual_snapshot_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;
        std::fs::write(dir.path().join("vdc.db"), b"schema v1").unwrap();

        let (status, body) = send_json(
            &state,
            authed(post_json("/api/v1/migrations/snapshot", json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        assert_eq!(body["status"], "created");

        let (_, body) = send_json(&state, get("/api/v1/migrations/snapshots")).await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_admin_status_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let (status, body) = send_json(&state, get("/api/v1/admin/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "quantix-release-agent");
        assert_eq!(body["signing_enabled"], false);
        assert_eq!(body["control_plane_configured"], false);

        let (status, body) = send_json(&state, get("/api/v1/admin/config")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["publish_token"], "(redacted)");
    }

    #[tokio::test]
    async fn test_generate_keys_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        let (status, body) = send_json(
            &state,
            authed(post_json(
                "/api/v1/admin/generate-keys",
                json!({"output_dir": dir.path().join("new-keys")}),
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        assert_eq!(body["status"], "generated");
        assert!(body["public_key"].is_string());
        assert!(dir.path().join("new-keys/signing.key").exists());
    }
}
