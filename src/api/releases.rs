//! Release endpoints: channels, manifests, artifacts, publish, delete

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::MAX_BODY_BYTES;
use crate::domain::product::{Channel, Product};
use crate::error::ApiError;
use crate::registry::{content_type_for, ReleaseRegistry};

pub fn parse_product(raw: &str) -> Result<Product, ApiError> {
    Product::from_str(raw)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown product '{}'", raw)))
}

fn parse_channel(raw: &str) -> Result<Channel, ApiError> {
    Channel::from_str(raw)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown channel '{}'", raw)))
}

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    channel: Option<String>,
}

impl ChannelQuery {
    /// Channel for endpoints that address exactly one channel.
    fn required(&self) -> Result<Channel, ApiError> {
        parse_channel(self.channel.as_deref().unwrap_or("stable"))
    }

    /// Channel filter for listings (absent means all channels).
    fn optional(&self) -> Result<Option<Channel>, ApiError> {
        self.channel.as_deref().map(parse_channel).transpose()
    }
}

fn map_multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge {
            limit_bytes: MAX_BODY_BYTES,
        }
    } else {
        ApiError::bad_request(format!("Malformed multipart body: {}", err))
    }
}

fn manifest_response(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(bytes),
    )
        .into_response()
}

/// `GET /channels`
pub async fn channels() -> Json<Vec<crate::domain::product::ChannelInfo>> {
    Json(ReleaseRegistry::list_channels())
}

/// `GET /{product}/manifest?channel=`
pub async fn latest_manifest(
    State(state): State<Arc<AppState>>,
    Path(product): Path<String>,
    Query(query): Query<ChannelQuery>,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;
    let channel = query.required()?;
    let bytes = state.registry.latest_manifest_bytes(product, channel).await?;
    Ok(manifest_response(bytes))
}

/// `GET /{product}/manifest/signed?channel=`
pub async fn signed_manifest(
    State(state): State<Arc<AppState>>,
    Path(product): Path<String>,
    Query(query): Query<ChannelQuery>,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;
    let channel = query.required()?;
    if !state.signing.enabled() {
        return Err(crate::error::SigningError::Disabled.into());
    }
    let bytes = state.registry.latest_manifest_bytes(product, channel).await?;
    let signed = state.signing.sign_bytes(&bytes)?;
    Ok(Json(signed).into_response())
}

/// `GET /{product}/releases?channel=`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(product): Path<String>,
    Query(query): Query<ChannelQuery>,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;
    let channel = query.optional()?;
    let releases = state.registry.list_releases(product, channel).await?;
    Ok(Json(releases).into_response())
}

/// `GET /{product}/releases/{version}/manifest?channel=`
pub async fn manifest(
    State(state): State<Arc<AppState>>,
    Path((product, version)): Path<(String, String)>,
    Query(query): Query<ChannelQuery>,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;
    let channel = query.required()?;
    let bytes = state
        .registry
        .manifest_bytes(product, channel, &version)
        .await?;
    Ok(manifest_response(bytes))
}

/// `GET /{product}/releases/{version}/{artifact}?channel=`
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((product, version, artifact)): Path<(String, String, String)>,
    Query(query): Query<ChannelQuery>,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;
    let channel = query.required()?;

    let (file, len) = state
        .registry
        .store()
        .open_artifact(product, channel, &version, &artifact)
        .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&artifact)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", artifact))
    {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((headers, body).into_response())
}

/// `POST /{product}/publish` (multipart)
///
/// The `manifest` part must come first: parts are consumed in stream
/// order, so the declared component list has to be known before any
/// artifact bytes arrive. Declared components with no matching part are
/// logged and skipped; a part matching no declared component is drained
/// and ignored.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Path(product): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;

    let manifest_field = multipart
        .next_field()
        .await
        .map_err(map_multipart_error)?
        .ok_or_else(|| ApiError::bad_request("Empty multipart body"))?;
    if manifest_field.name() != Some("manifest") {
        return Err(ApiError::bad_request(
            "The 'manifest' part must be the first part of the upload",
        ));
    }
    let manifest_bytes = manifest_field
        .bytes()
        .await
        .map_err(map_multipart_error)?;

    let mut session = state.registry.begin_publish(product, &manifest_bytes).await?;
    let channel = session.channel;
    let version = session.version.clone();

    while let Some(mut field) = multipart.next_field().await.map_err(map_multipart_error)? {
        let part_name = field.name().map(|s| s.to_string());
        let part_filename = field.file_name().map(|s| s.to_string());

        let Some(target) = session.match_part(part_name.as_deref(), part_filename.as_deref())
        else {
            warn!(
                part = ?part_name,
                filename = ?part_filename,
                "upload part matches no declared component; ignoring"
            );
            while field.chunk().await.map_err(map_multipart_error)?.is_some() {}
            continue;
        };

        let mut writer = state
            .registry
            .store()
            .begin_artifact(product, channel, &version, &target.filename)
            .await?;

        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    writer.abort().await;
                    return Err(map_multipart_error(e));
                }
            };
            if let Err(e) = writer.write_chunk(&chunk).await {
                writer.abort().await;
                return Err(crate::error::StoreError::from(e).into());
            }
        }

        let (size, digest) = writer
            .finish()
            .await
            .map_err(crate::error::StoreError::from)?;

        if let Some(expected) = &target.declared_sha256 {
            if !expected.eq_ignore_ascii_case(&digest) {
                state
                    .registry
                    .store()
                    .remove_artifact(product, channel, &version, &target.filename)
                    .await?;
                return Err(ApiError::bad_request_with(
                    format!("Artifact hash mismatch for '{}'", target.label),
                    json!({
                        "artifact": target.filename,
                        "expected": expected,
                        "actual": digest,
                    }),
                ));
            }
        }

        state
            .registry
            .store()
            .write_sha256_sidecar(product, channel, &version, &target.filename, &digest)
            .await?;

        info!(
            product = %product.as_str(),
            version = %version,
            artifact = %target.filename,
            size,
            "stored release artifact"
        );
        session.record_saved(target.filename);
    }

    let artifacts = session.finish();
    info!(
        product = %product.as_str(),
        channel = %channel.as_str(),
        version = %version,
        count = artifacts.len(),
        "published release"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "published",
            "product": product.as_str(),
            "version": version,
            "channel": channel.as_str(),
            "artifacts": artifacts,
        })),
    )
        .into_response())
}

/// `DELETE /{product}/releases/{version}?channel=`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((product, version)): Path<(String, String)>,
    Query(query): Query<ChannelQuery>,
) -> Result<Response, ApiError> {
    let product = parse_product(&product)?;
    let channel = query.required()?;

    state
        .registry
        .delete_release(product, channel, &version)
        .await?;
    info!(
        product = %product.as_str(),
        channel = %channel.as_str(),
        version = %version,
        "deleted release"
    );

    Ok(Json(json!({
        "status": "deleted",
        "product": product.as_str(),
        "version": version,
        "channel": channel.as_str(),
    }))
    .into_response())
}
