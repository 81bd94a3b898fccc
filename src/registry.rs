//! Release registry - publish, list, fetch, delete
//!
//! Composes the artifact store, the manifest model, and version ordering
//! into the release-facing operations. Uploaded manifest bytes are stored
//! verbatim; the typed manifest exists only for validation and listings.
//!
//! Publishing is a session: the manifest part is validated and persisted
//! first, then each uploaded part is matched against the declared
//! components (by part name, then by artifact filename) and streamed to
//! disk by the caller. Declared components with no uploaded part are
//! logged and skipped, which deliberately permits manifest-only
//! republishes.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::manifest::Manifest;
use crate::domain::product::{Channel, ChannelInfo, Product, ReleaseInfo};
use crate::error::{ManifestError, StoreError};
use crate::store::{ArtifactStore, MANIFEST_FILENAME};

/// Derive a response content type from the artifact extension.
pub fn content_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".json") {
        "application/json"
    } else if filename.ends_with(".tar.zst") || filename.ends_with(".zst") {
        "application/zstd"
    } else {
        "application/octet-stream"
    }
}

/// What an uploaded multipart part maps to.
#[derive(Debug, Clone)]
pub struct PartTarget {
    /// Declared artifact filename (becomes the on-disk name)
    pub filename: String,
    /// Expected SHA-256, when the manifest declares one
    pub declared_sha256: Option<String>,
    /// Component name (or "full_image") for diagnostics
    pub label: String,
}

/// In-flight publish. Created once the manifest part has been validated
/// and persisted.
#[derive(Debug)]
pub struct PublishSession {
    pub product: Product,
    pub channel: Channel,
    pub version: String,
    manifest: Manifest,
    saved: Vec<String>,
    matched: HashSet<String>,
}

impl PublishSession {
    /// Match an uploaded part to a declared component or the full image.
    pub fn match_part(
        &mut self,
        part_name: Option<&str>,
        part_filename: Option<&str>,
    ) -> Option<PartTarget> {
        for component in &self.manifest.components {
            let by_name = part_name == Some(component.name.as_str());
            let by_filename = part_filename == Some(component.artifact.as_str())
                || part_name == Some(component.artifact.as_str());
            if by_name || by_filename {
                self.matched.insert(component.artifact.clone());
                return Some(PartTarget {
                    filename: component.artifact.clone(),
                    declared_sha256: component.sha256.clone(),
                    label: component.name.clone(),
                });
            }
        }

        if let Some(full_image) = &self.manifest.full_image {
            let artifact = full_image.artifact.as_deref()?;
            let by_name = matches!(part_name, Some("full_image") | Some("full-image"));
            let by_filename = part_filename == Some(artifact) || part_name == Some(artifact);
            if by_name || by_filename {
                self.matched.insert(artifact.to_string());
                return Some(PartTarget {
                    filename: artifact.to_string(),
                    declared_sha256: full_image.sha256.clone(),
                    label: "full_image".to_string(),
                });
            }
        }

        None
    }

    /// Record a part that was streamed to disk.
    pub fn record_saved(&mut self, filename: impl Into<String>) {
        self.saved.push(filename.into());
    }

    /// Close the session: log declared artifacts that never arrived and
    /// return the saved-artifact list for the response.
    pub fn finish(self) -> Vec<String> {
        for component in &self.manifest.components {
            if !self.matched.contains(&component.artifact) {
                warn!(
                    product = %self.product.as_str(),
                    version = %self.version,
                    component = %component.name,
                    artifact = %component.artifact,
                    "declared component had no uploaded part; skipped"
                );
            }
        }
        if let Some(artifact) = self
            .manifest
            .full_image
            .as_ref()
            .and_then(|f| f.artifact.as_deref())
        {
            if !self.matched.contains(artifact) {
                warn!(
                    product = %self.product.as_str(),
                    version = %self.version,
                    artifact = %artifact,
                    "declared full image had no uploaded part; skipped"
                );
            }
        }
        self.saved
    }
}

/// The release-facing facade over the on-disk tree.
#[derive(Debug, Clone)]
pub struct ReleaseRegistry {
    store: ArtifactStore,
}

impl ReleaseRegistry {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The three fixed channels.
    pub fn list_channels() -> Vec<ChannelInfo> {
        Channel::all().into_iter().map(ChannelInfo::from).collect()
    }

    /// Flatten releases across the requested channel(s), newest first per
    /// channel. Malformed manifest files are an operator concern and are
    /// skipped, never surfaced to clients.
    pub async fn list_releases(
        &self,
        product: Product,
        channel: Option<Channel>,
    ) -> Result<Vec<ReleaseInfo>, StoreError> {
        let channels: Vec<Channel> = match channel {
            Some(c) => vec![c],
            None => Channel::all().to_vec(),
        };

        let mut releases = Vec::new();
        for channel in channels {
            for version in self.store.enumerate_versions(product, channel).await? {
                let bytes = match self
                    .store
                    .read_manifest_bytes(product, channel, &version)
                    .await
                {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        debug!(version = %version, error = %e, "skipping unreadable manifest");
                        continue;
                    }
                };
                match serde_json::from_slice::<Manifest>(&bytes) {
                    Ok(manifest) => releases.push(ReleaseInfo {
                        version,
                        channel: channel.as_str().to_string(),
                        release_date: manifest.release_date,
                        update_type: manifest.update_type,
                    }),
                    Err(e) => {
                        debug!(version = %version, error = %e, "skipping malformed manifest");
                    }
                }
            }
        }
        Ok(releases)
    }

    /// Stored bytes of the newest manifest in a channel.
    pub async fn latest_manifest_bytes(
        &self,
        product: Product,
        channel: Channel,
    ) -> Result<Vec<u8>, StoreError> {
        let versions = self.store.enumerate_versions(product, channel).await?;
        let Some(latest) = versions.first() else {
            return Err(StoreError::ReleaseNotFound {
                product: product.as_str().to_string(),
                channel: channel.as_str().to_string(),
                version: "latest".to_string(),
            });
        };
        self.store
            .read_manifest_bytes(product, channel, latest)
            .await
    }

    /// Stored bytes of one release's manifest.
    pub async fn manifest_bytes(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
    ) -> Result<Vec<u8>, StoreError> {
        self.store
            .read_manifest_bytes(product, channel, version)
            .await
    }

    /// Validate the uploaded manifest and persist its raw bytes, opening
    /// a publish session for the artifact parts that follow.
    pub async fn begin_publish(
        &self,
        product: Product,
        manifest_bytes: &[u8],
    ) -> Result<PublishSession, PublishError> {
        let manifest = Manifest::parse_validated(manifest_bytes, product)?;

        let Some(channel) = Channel::from_str(&manifest.channel) else {
            return Err(PublishError::Manifest(ManifestError::UnknownChannel {
                value: manifest.channel.clone(),
            }));
        };
        let version = manifest.version.clone();

        self.store
            .write_file(product, channel, &version, MANIFEST_FILENAME, manifest_bytes)
            .await?;

        let mut session = PublishSession {
            product,
            channel,
            version,
            manifest,
            saved: Vec::new(),
            matched: HashSet::new(),
        };
        session.record_saved(MANIFEST_FILENAME);
        Ok(session)
    }

    pub async fn delete_release(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
    ) -> Result<(), StoreError> {
        self.store.delete_release(product, channel, version).await
    }
}

/// Publish can fail on the manifest or on the filesystem.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PublishError> for crate::error::ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Manifest(e) => e.into(),
            PublishError::Store(e) => e.into(),
        }
    }
}
