//! Centralized error types for the release agent
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.
//! `ApiError` is the HTTP edge: every component error converts into it
//! and maps to a status code plus a `{error, ...}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid artifact filename: {name}")]
    InvalidFilename { name: String },

    #[error("Release {product}/{channel}/{version} not found")]
    ReleaseNotFound {
        product: String,
        channel: String,
        version: String,
    },

    #[error("Artifact {name} not found")]
    ArtifactNotFound { name: String },

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Manifest validation errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Manifest product '{manifest}' does not match URL product '{url}'")]
    ProductMismatch { manifest: String, url: String },

    #[error("Manifest field '{field}' must not be empty")]
    EmptyField { field: String },

    #[error("Invalid update_type '{value}' (expected 'component' or 'full')")]
    InvalidUpdateType { value: String },

    #[error("Unknown channel '{value}'")]
    UnknownChannel { value: String },

    #[error("Component '{component}' has invalid sha256 '{sha256}'")]
    InvalidSha256 { component: String, sha256: String },

    #[error("full_image is missing required field '{field}'")]
    IncompleteFullImage { field: String },

    #[error("Invalid release_date '{value}': not an RFC 3339 timestamp")]
    InvalidReleaseDate { value: String },
}

/// Signing subsystem errors
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Signing is not configured (no private key loaded)")]
    Disabled,

    #[error("Private key at {path} has invalid length {len} (expected 64 bytes)")]
    InvalidKeyLength { path: String, len: usize },

    #[error("Failed to read key file {path}: {source}")]
    KeyRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Signature verification failed: {0}")]
    Verification(String),

    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("Failed to write key file {path}: {source}")]
    KeyWrite {
        path: String,
        source: std::io::Error,
    },
}

/// Maintenance coordinator errors
#[derive(Error, Debug)]
pub enum MaintenanceError {
    #[error("Node {node_id} has no maintenance record")]
    NodeNotFound { node_id: String },

    #[error("Node {node_id} is {state}; cancel is not permitted while an update is applying")]
    CancelProtected { node_id: String, state: String },
}

/// Migration lifecycle errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("A migration is already in progress (phase: {phase})")]
    AlreadyRunning { phase: String },

    #[error("No snapshot available for rollback")]
    NoSnapshot,

    #[error("Snapshot failed: {0}")]
    Snapshot(String),
}

/// HTTP-facing error with status mapping
///
/// Integrity failures (hash/signature) surface as BadRequest with
/// diagnostic fields per the propagation policy. I/O surfaces as 500.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Missing or invalid authorization token")]
    Unauthorized,

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Request body exceeds the {limit_bytes} byte limit")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("{message}")]
    NotImplemented { message: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::BadRequest {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::NotImplemented {
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }

        let mut body = json!({ "error": self.to_string() });
        if let Self::BadRequest {
            details: Some(details),
            ..
        } = &self
        {
            if let (Some(obj), Some(extra)) = (body.as_object_mut(), details.as_object()) {
                for (k, v) in extra {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidFilename { .. } => Self::bad_request(err.to_string()),
            StoreError::ReleaseNotFound { .. } | StoreError::ArtifactNotFound { .. } => {
                Self::not_found(err.to_string())
            }
            StoreError::Io(e) => Self::Internal(anyhow::Error::new(e).context("artifact store")),
        }
    }
}

impl From<ManifestError> for ApiError {
    fn from(err: ManifestError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<SigningError> for ApiError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::Disabled => Self::not_implemented(err.to_string()),
            SigningError::Verification(_) | SigningError::Decode { .. } => {
                Self::bad_request(err.to_string())
            }
            other => Self::Internal(anyhow::Error::new(other).context("signing")),
        }
    }
}

impl From<MaintenanceError> for ApiError {
    fn from(err: MaintenanceError) -> Self {
        match err {
            MaintenanceError::NodeNotFound { .. } => Self::not_found(err.to_string()),
            MaintenanceError::CancelProtected { .. } => Self::conflict(err.to_string()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyRunning { .. } => Self::conflict(err.to_string()),
            LifecycleError::NoSnapshot => Self::bad_request(err.to_string()),
            other => Self::Internal(anyhow::Error::new(other).context("migration lifecycle")),
        }
    }
}
