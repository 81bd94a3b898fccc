//! Release manifest model
//!
//! The manifest is the descriptor a build pipeline uploads alongside its
//! artifacts, and the document update agents fetch to decide what to
//! install. The server stores the uploaded bytes verbatim; this typed view
//! exists for validation and for composing responses. The signed wrapper
//! carries the exact bytes that were signed (`RawValue`), so verifiers are
//! immune to field reordering between server versions.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ManifestError;
use crate::domain::product::Product;

/// One updatable unit within a release. The (name, install_path) pair is
/// the identity an agent uses to place bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Artifact filename within the release directory
    pub artifact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub install_path: String,
    /// Host-side service cycled after file replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_db_migration: Option<bool>,
}

/// Whole-system artifact for A/B boot-partition updates.
///
/// Fields are optional at the serde layer so that rule (e) of manifest
/// validation can report which one is missing instead of a bare parse
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_reboot: Option<bool>,
}

impl FullImage {
    /// All four fields, post-validation.
    pub fn checked(&self) -> Result<(&str, &str, u64, bool), ManifestError> {
        let missing = |field: &str| ManifestError::IncompleteFullImage {
            field: field.to_string(),
        };
        Ok((
            self.artifact.as_deref().ok_or_else(|| missing("artifact"))?,
            self.sha256.as_deref().ok_or_else(|| missing("sha256"))?,
            self.size_bytes.ok_or_else(|| missing("size_bytes"))?,
            self.requires_reboot
                .ok_or_else(|| missing("requires_reboot"))?,
        ))
    }
}

/// The release descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub product: String,
    pub version: String,
    pub channel: String,
    pub release_date: String,
    pub update_type: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_image: Option<FullImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_supported_previous_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
}

fn is_hex_sha256(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl Manifest {
    /// Parse and validate uploaded manifest bytes against the URL product.
    pub fn parse_validated(bytes: &[u8], url_product: Product) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        manifest.validate(url_product)?;
        Ok(manifest)
    }

    /// Ingest validation rules (a)-(f).
    pub fn validate(&self, url_product: Product) -> Result<(), ManifestError> {
        if self.product != url_product.as_str() {
            return Err(ManifestError::ProductMismatch {
                manifest: self.product.clone(),
                url: url_product.as_str().to_string(),
            });
        }

        if self.version.is_empty() {
            return Err(ManifestError::EmptyField {
                field: "version".to_string(),
            });
        }
        if self.channel.is_empty() {
            return Err(ManifestError::EmptyField {
                field: "channel".to_string(),
            });
        }

        if self.update_type != "component" && self.update_type != "full" {
            return Err(ManifestError::InvalidUpdateType {
                value: self.update_type.clone(),
            });
        }

        for component in &self.components {
            if let Some(sha256) = &component.sha256 {
                if !is_hex_sha256(sha256) {
                    return Err(ManifestError::InvalidSha256 {
                        component: component.name.clone(),
                        sha256: sha256.clone(),
                    });
                }
            }
        }

        if let Some(full_image) = &self.full_image {
            full_image.checked()?;
        }

        if chrono::DateTime::parse_from_rfc3339(&self.release_date).is_err() {
            return Err(ManifestError::InvalidReleaseDate {
                value: self.release_date.clone(),
            });
        }

        Ok(())
    }
}

/// Manifest wrapped with an Ed25519 signature over its exact bytes.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedManifest {
    /// The canonical manifest JSON, byte-for-byte as signed
    pub manifest: Box<RawValue>,
    /// Base64 signature over the manifest bytes
    pub signature: String,
    pub key_id: String,
    /// RFC 3339 UTC timestamp of signing
    pub signed_at: String,
    pub algorithm: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest_json() -> String {
        r#"{
            "product": "quantix-os",
            "version": "0.0.5",
            "channel": "dev",
            "release_date": "2026-01-01T00:00:00Z",
            "update_type": "component",
            "components": [{
                "name": "qx-node",
                "artifact": "qx-node.tar.zst",
                "sha256": "0000000000000000000000000000000000000000000000000000000000000000",
                "size_bytes": 42,
                "install_path": "/data/bin/qx-node"
            }]
        }"#
        .to_string()
    }

    #[test]
    fn test_valid_manifest_parses() {
        let manifest =
            Manifest::parse_validated(sample_manifest_json().as_bytes(), Product::QuantixOs)
                .unwrap();
        assert_eq!(manifest.version, "0.0.5");
        assert_eq!(manifest.components.len(), 1);
        assert_eq!(manifest.components[0].install_path, "/data/bin/qx-node");
    }

    #[test]
    fn test_product_mismatch_rejected() {
        let err = Manifest::parse_validated(sample_manifest_json().as_bytes(), Product::QuantixVdc)
            .unwrap_err();
        assert!(matches!(err, ManifestError::ProductMismatch { .. }));
    }

    #[test]
    fn test_empty_version_rejected() {
        let json = sample_manifest_json().replace("\"0.0.5\"", "\"\"");
        let err = Manifest::parse_validated(json.as_bytes(), Product::QuantixOs).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyField { ref field } if field == "version"));
    }

    #[test]
    fn test_bad_update_type_rejected() {
        let json = sample_manifest_json().replace("\"component\"", "\"delta\"");
        let err = Manifest::parse_validated(json.as_bytes(), Product::QuantixOs).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidUpdateType { .. }));
    }

    #[test]
    fn test_short_sha256_rejected() {
        let json = sample_manifest_json().replace(
            "0000000000000000000000000000000000000000000000000000000000000000",
            "abc123",
        );
        let err = Manifest::parse_validated(json.as_bytes(), Product::QuantixOs).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidSha256 { .. }));
    }

    #[test]
    fn test_incomplete_full_image_rejected() {
        let mut manifest: Manifest =
            serde_json::from_str(&sample_manifest_json()).unwrap();
        manifest.update_type = "full".to_string();
        manifest.full_image = Some(FullImage {
            artifact: Some("quantix-os-0.0.5.img.zst".to_string()),
            sha256: None,
            size_bytes: Some(1024),
            requires_reboot: Some(true),
        });
        let err = manifest.validate(Product::QuantixOs).unwrap_err();
        assert!(matches!(err, ManifestError::IncompleteFullImage { ref field } if field == "sha256"));
    }

    #[test]
    fn test_bad_release_date_rejected() {
        let json = sample_manifest_json().replace("2026-01-01T00:00:00Z", "yesterday");
        let err = Manifest::parse_validated(json.as_bytes(), Product::QuantixOs).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidReleaseDate { .. }));
    }

    #[test]
    fn test_signed_manifest_preserves_bytes() {
        let raw = serde_json::value::RawValue::from_string(sample_manifest_json()).unwrap();
        let signed = SignedManifest {
            manifest: raw,
            signature: "c2ln".to_string(),
            key_id: "quantix-release-1".to_string(),
            signed_at: "2026-01-01T00:00:00Z".to_string(),
            algorithm: "ed25519".to_string(),
        };
        let encoded = serde_json::to_string(&signed).unwrap();
        let decoded: SignedManifest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.manifest.get(), signed.manifest.get());
    }
}
