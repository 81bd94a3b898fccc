//! Artifact store - on-disk release tree
//!
//! Owns `<root>/<product>/<channel>/<version>/` plus the sibling
//! `<root>/iso/` tree. Writes are streamed to a temp file in the target
//! directory with SHA-256 computed on the write path, then renamed into
//! place, so no partial file is ever visible under an artifact name.
//! Everything that becomes a path component goes through the sanitizer
//! first.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::domain::product::{Channel, Product};
use crate::error::StoreError;
use crate::version;

/// Filename of the release descriptor inside a version directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Reject anything that is not a plain file/directory base name.
pub fn sanitize_path_component(name: &str) -> Result<&str, StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(StoreError::InvalidFilename {
            name: name.to_string(),
        });
    }
    Ok(name)
}

/// Content-addressed release artifact storage.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the release root and the iso tree if absent.
    pub async fn init(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::create_dir_all(self.root.join("iso")).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one (product, channel, version) triple.
    pub fn release_dir(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
    ) -> Result<PathBuf, StoreError> {
        let version = sanitize_path_component(version)?;
        Ok(self
            .root
            .join(product.as_str())
            .join(channel.as_str())
            .join(version))
    }

    /// Begin a streamed artifact write. The returned writer must be
    /// finished (rename into place) or aborted (unlink the temp file).
    pub async fn begin_artifact(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
        filename: &str,
    ) -> Result<ArtifactWriter, StoreError> {
        let filename = sanitize_path_component(filename)?;
        let dir = self.release_dir(product, channel, version)?;
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = dir.join(filename);
        let temp_path = dir.join(format!(".{}.partial", filename));
        let file = tokio::fs::File::create(&temp_path).await?;

        Ok(ArtifactWriter {
            file: Some(file),
            hasher: Sha256::new(),
            bytes_written: 0,
            temp_path,
            final_path,
        })
    }

    /// Convenience wrapper for callers that already hold the full bytes
    /// (manifests, sidecars). Same temp+rename discipline.
    pub async fn write_file(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(u64, String), StoreError> {
        let mut writer = self
            .begin_artifact(product, channel, version, filename)
            .await?;
        writer.write_chunk(bytes).await?;
        Ok(writer.finish().await?)
    }

    /// Resolve an existing artifact, returning its open file and length.
    pub async fn open_artifact(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
        filename: &str,
    ) -> Result<(tokio::fs::File, u64), StoreError> {
        let filename = sanitize_path_component(filename)?;
        let path = self.release_dir(product, channel, version)?.join(filename);

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ArtifactNotFound {
                    name: filename.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Read the stored manifest bytes for a release.
    pub async fn read_manifest_bytes(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let path = self
            .release_dir(product, channel, version)?
            .join(MANIFEST_FILENAME);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ReleaseNotFound {
                    product: product.as_str().to_string(),
                    channel: channel.as_str().to_string(),
                    version: version.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a single artifact (used when a hash mismatch disavows an
    /// upload). Missing files are not an error here.
    pub async fn remove_artifact(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
        filename: &str,
    ) -> Result<(), StoreError> {
        let filename = sanitize_path_component(filename)?;
        let path = self.release_dir(product, channel, version)?.join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Recursively remove a whole version directory.
    pub async fn delete_release(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
    ) -> Result<(), StoreError> {
        let dir = self.release_dir(product, channel, version)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ReleaseNotFound {
                    product: product.as_str().to_string(),
                    channel: channel.as_str().to_string(),
                    version: version.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Versions that hold a manifest, newest first.
    pub async fn enumerate_versions(
        &self,
        product: Product,
        channel: Channel,
    ) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(product.as_str()).join(channel.as_str());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if !entry.path().join(MANIFEST_FILENAME).exists() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                versions.push(name.to_string());
            }
        }

        version::sort_descending(&mut versions);
        Ok(versions)
    }

    /// Write `<artifact>.sha256` next to an artifact, in the canonical
    /// `<hex>  <basename>` format.
    pub async fn write_sha256_sidecar(
        &self,
        product: Product,
        channel: Channel,
        version: &str,
        filename: &str,
        digest: &str,
    ) -> Result<(), StoreError> {
        let filename = sanitize_path_component(filename)?;
        let sidecar = format!("{}.sha256", filename);
        let contents = format!("{}  {}\n", digest, filename);
        self.write_file(product, channel, version, &sidecar, contents.as_bytes())
            .await?;
        Ok(())
    }
}

/// In-flight streamed write. Holds the temp file, the running hash, and
/// the rename target.
pub struct ArtifactWriter {
    file: Option<tokio::fs::File>,
    hasher: Sha256,
    bytes_written: u64,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl ArtifactWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), std::io::Error> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.hasher.update(chunk);
            self.bytes_written += chunk.len() as u64;
        }
        Ok(())
    }

    /// Flush, fsync, and rename into place. Returns (size, sha256-hex).
    pub async fn finish(mut self) -> Result<(u64, String), std::io::Error> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&self.temp_path, &self.final_path).await?;
        let digest = format!("{:x}", std::mem::take(&mut self.hasher).finalize());
        Ok((self.bytes_written, digest))
    }

    /// Drop the temp file without publishing it.
    pub async fn abort(mut self) {
        self.file.take();
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "failed to remove partial upload");
            }
        }
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        // A writer dropped mid-stream (client disconnect) must not leave
        // a partial file behind.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert!(sanitize_path_component("..").is_err());
        assert!(sanitize_path_component("a/b").is_err());
        assert!(sanitize_path_component("a\\b").is_err());
        assert!(sanitize_path_component("").is_err());
        assert!(sanitize_path_component("qx-node.tar.zst").is_ok());
    }

    #[tokio::test]
    async fn test_streamed_write_hashes_and_renames() {
        let (_dir, store) = store();
        let mut writer = store
            .begin_artifact(Product::QuantixOs, Channel::Dev, "1.0.0", "blob.bin")
            .await
            .unwrap();
        writer.write_chunk(b"hello ").await.unwrap();
        writer.write_chunk(b"world").await.unwrap();
        let (size, digest) = writer.finish().await.unwrap();

        assert_eq!(size, 11);
        // sha256("hello world")
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let path = store
            .release_dir(Product::QuantixOs, Channel::Dev, "1.0.0")
            .unwrap()
            .join("blob.bin");
        assert_eq!(std::fs::read(path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing() {
        let (_dir, store) = store();
        let mut writer = store
            .begin_artifact(Product::QuantixOs, Channel::Dev, "1.0.0", "blob.bin")
            .await
            .unwrap();
        writer.write_chunk(b"partial").await.unwrap();
        writer.abort().await;

        let dir = store
            .release_dir(Product::QuantixOs, Channel::Dev, "1.0.0")
            .unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_enumerate_versions_descending() {
        let (_dir, store) = store();
        for version in ["1.0.0", "1.0.10", "1.0.2"] {
            store
                .write_file(
                    Product::QuantixOs,
                    Channel::Dev,
                    version,
                    MANIFEST_FILENAME,
                    b"{}",
                )
                .await
                .unwrap();
        }
        // A directory without a manifest is not a release.
        tokio::fs::create_dir_all(store.root().join("quantix-os/dev/2.0.0"))
            .await
            .unwrap();

        let versions = store
            .enumerate_versions(Product::QuantixOs, Channel::Dev)
            .await
            .unwrap();
        assert_eq!(versions, vec!["1.0.10", "1.0.2", "1.0.0"]);
    }

    #[tokio::test]
    async fn test_enumerate_empty_channel() {
        let (_dir, store) = store();
        let versions = store
            .enumerate_versions(Product::QuantixVdc, Channel::Stable)
            .await
            .unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn test_delete_release_is_idempotent_at_request_level() {
        let (_dir, store) = store();
        store
            .write_file(
                Product::QuantixOs,
                Channel::Dev,
                "1.0.0",
                MANIFEST_FILENAME,
                b"{}",
            )
            .await
            .unwrap();

        store
            .delete_release(Product::QuantixOs, Channel::Dev, "1.0.0")
            .await
            .unwrap();
        let err = store
            .delete_release(Product::QuantixOs, Channel::Dev, "1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReleaseNotFound { .. }));
    }

    #[tokio::test]
    async fn test_sidecar_format() {
        let (_dir, store) = store();
        store
            .write_sha256_sidecar(Product::QuantixOs, Channel::Dev, "1.0.0", "blob.bin", "ab12")
            .await
            .unwrap();
        let sidecar = store
            .release_dir(Product::QuantixOs, Channel::Dev, "1.0.0")
            .unwrap()
            .join("blob.bin.sha256");
        assert_eq!(std::fs::read_to_string(sidecar).unwrap(), "ab12  blob.bin\n");
    }

    #[tokio::test]
    async fn test_open_artifact_not_found() {
        let (_dir, store) = store();
        let err = store
            .open_artifact(Product::QuantixOs, Channel::Dev, "1.0.0", "missing.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ArtifactNotFound { .. }));
    }
}
