//! Manifest signing and verification
//!
//! Ed25519 is the sole algorithm. The private key is loaded once at
//! startup from the configured path and immutable thereafter; without a
//! configured path the subsystem is disabled and the signed-manifest
//! endpoint reports 501. Signatures always cover the exact stored
//! manifest bytes, never a re-serialization, so verifiers are immune to
//! JSON field reordering between server versions.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::path::{Path, PathBuf};

use crate::domain::manifest::{Manifest, SignedManifest};
use crate::error::SigningError;

pub const ALGORITHM: &str = "ed25519";

const KEYPAIR_BYTES: usize = 64;
const PRIVATE_KEY_FILENAME: &str = "signing.key";
const PUBLIC_KEY_FILENAME: &str = "signing.pub";

/// Holds the optional signing keypair and the configured key id.
pub struct SigningService {
    signing_key: Option<SigningKey>,
    public_key_b64: Option<String>,
    key_id: String,
}

impl SigningService {
    /// Load the private key named in configuration, or run disabled.
    pub fn init(
        private_key_path: Option<&Path>,
        key_id: impl Into<String>,
    ) -> Result<Self, SigningError> {
        let key_id = key_id.into();

        let Some(path) = private_key_path else {
            return Ok(Self {
                signing_key: None,
                public_key_b64: None,
                key_id,
            });
        };

        let signing_key = load_private_key(path)?;
        let public_key_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());
        tracing::info!(key_id = %key_id, path = %path.display(), "manifest signing enabled");

        Ok(Self {
            signing_key: Some(signing_key),
            public_key_b64: Some(public_key_b64),
            key_id,
        })
    }

    pub fn enabled(&self) -> bool {
        self.signing_key.is_some()
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Base64 public key for operator distribution.
    pub fn public_key_b64(&self) -> Result<&str, SigningError> {
        self.public_key_b64.as_deref().ok_or(SigningError::Disabled)
    }

    /// Sign exact manifest bytes (must be valid JSON, which stored
    /// manifests always are).
    pub fn sign_bytes(&self, manifest_bytes: &[u8]) -> Result<SignedManifest, SigningError> {
        let signing_key = self.signing_key.as_ref().ok_or(SigningError::Disabled)?;

        let json = String::from_utf8(manifest_bytes.to_vec()).map_err(|e| {
            SigningError::Decode {
                what: "manifest bytes".to_string(),
                message: e.to_string(),
            }
        })?;
        let raw = serde_json::value::RawValue::from_string(json).map_err(|e| {
            SigningError::Decode {
                what: "manifest JSON".to_string(),
                message: e.to_string(),
            }
        })?;

        let signature = signing_key.sign(raw.get().as_bytes());

        Ok(SignedManifest {
            manifest: raw,
            signature: BASE64.encode(signature.to_bytes()),
            key_id: self.key_id.clone(),
            signed_at: chrono::Utc::now().to_rfc3339(),
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Serialize a manifest in its declared field order and sign it.
    pub fn sign(&self, manifest: &Manifest) -> Result<SignedManifest, SigningError> {
        let bytes = serde_json::to_vec(manifest).map_err(|e| SigningError::Decode {
            what: "manifest".to_string(),
            message: e.to_string(),
        })?;
        self.sign_bytes(&bytes)
    }

    /// Verify a signed wrapper against a base64 public key and parse the
    /// manifest it carries. Any decode or verification failure is an
    /// integrity error.
    pub fn verify(
        signed: &SignedManifest,
        expected_public_key_b64: &str,
    ) -> Result<Manifest, SigningError> {
        let key_bytes = BASE64
            .decode(expected_public_key_b64)
            .map_err(|e| SigningError::Decode {
                what: "public key".to_string(),
                message: e.to_string(),
            })?;
        let key_bytes: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            SigningError::Decode {
                what: "public key".to_string(),
                message: format!("expected 32 bytes, got {}", key_bytes.len()),
            }
        })?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SigningError::Verification(e.to_string()))?;

        let sig_bytes = BASE64
            .decode(&signed.signature)
            .map_err(|e| SigningError::Decode {
                what: "signature".to_string(),
                message: e.to_string(),
            })?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| SigningError::Verification(e.to_string()))?;

        verifying_key
            .verify(signed.manifest.get().as_bytes(), &signature)
            .map_err(|e| SigningError::Verification(e.to_string()))?;

        serde_json::from_str(signed.manifest.get()).map_err(|e| SigningError::Decode {
            what: "verified manifest".to_string(),
            message: e.to_string(),
        })
    }
}

fn load_private_key(path: &Path) -> Result<SigningKey, SigningError> {
    let raw = std::fs::read(path).map_err(|source| SigningError::KeyRead {
        path: path.display().to_string(),
        source,
    })?;

    let key_bytes: Vec<u8> = if raw.len() == KEYPAIR_BYTES {
        raw
    } else {
        let text = String::from_utf8_lossy(&raw);
        BASE64
            .decode(text.trim())
            .map_err(|_| SigningError::InvalidKeyLength {
                path: path.display().to_string(),
                len: raw.len(),
            })?
    };

    let key_bytes: [u8; KEYPAIR_BYTES] =
        key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| SigningError::InvalidKeyLength {
                path: path.display().to_string(),
                len: key_bytes.len(),
            })?;

    SigningKey::from_keypair_bytes(&key_bytes)
        .map_err(|e| SigningError::Verification(e.to_string()))
}

/// Result of keypair generation.
#[derive(Debug)]
pub struct GeneratedKeypair {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    pub public_key_b64: String,
}

/// Generate a fresh keypair under `output_dir`. The private key is
/// written base64-encoded with owner-only read permission, the public key
/// world-readable.
pub fn generate_keypair(output_dir: &Path) -> Result<GeneratedKeypair, SigningError> {
    std::fs::create_dir_all(output_dir).map_err(|source| SigningError::KeyWrite {
        path: output_dir.display().to_string(),
        source,
    })?;

    let signing_key = SigningKey::generate(&mut OsRng);
    let private_b64 = BASE64.encode(signing_key.to_keypair_bytes());
    let public_b64 = BASE64.encode(signing_key.verifying_key().to_bytes());

    let private_key_path = output_dir.join(PRIVATE_KEY_FILENAME);
    let public_key_path = output_dir.join(PUBLIC_KEY_FILENAME);

    write_key_file(&private_key_path, &private_b64, 0o600)?;
    write_key_file(&public_key_path, &public_b64, 0o644)?;

    tracing::info!(
        private = %private_key_path.display(),
        public = %public_key_path.display(),
        "generated Ed25519 keypair"
    );

    Ok(GeneratedKeypair {
        private_key_path,
        public_key_path,
        public_key_b64: public_b64,
    })
}

fn write_key_file(path: &Path, contents: &str, mode: u32) -> Result<(), SigningError> {
    let wrap = |source| SigningError::KeyWrite {
        path: path.display().to_string(),
        source,
    };

    std::fs::write(path, format!("{}\n", contents)).map_err(wrap)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(wrap)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::Product;

    fn manifest_json() -> &'static str {
        r#"{"product":"quantix-os","version":"0.0.5","channel":"dev","release_date":"2026-01-01T00:00:00Z","update_type":"component","components":[]}"#
    }

    fn service_with_fresh_key(dir: &Path) -> SigningService {
        let generated = generate_keypair(dir).unwrap();
        SigningService::init(Some(&generated.private_key_path), "test-key-1").unwrap()
    }

    #[test]
    fn test_disabled_without_key_path() {
        let service = SigningService::init(None, "test-key-1").unwrap();
        assert!(!service.enabled());
        assert!(matches!(
            service.sign_bytes(manifest_json().as_bytes()),
            Err(SigningError::Disabled)
        ));
        assert!(matches!(
            service.public_key_b64(),
            Err(SigningError::Disabled)
        ));
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_fresh_key(dir.path());

        let signed = service.sign_bytes(manifest_json().as_bytes()).unwrap();
        assert_eq!(signed.algorithm, "ed25519");
        assert_eq!(signed.key_id, "test-key-1");
        assert_eq!(signed.manifest.get(), manifest_json());

        let manifest =
            SigningService::verify(&signed, service.public_key_b64().unwrap()).unwrap();
        assert_eq!(manifest.product, Product::QuantixOs.as_str());
        assert_eq!(manifest.version, "0.0.5");
    }

    #[test]
    fn test_sign_typed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_fresh_key(dir.path());

        let manifest: Manifest = serde_json::from_str(manifest_json()).unwrap();
        let signed = service.sign(&manifest).unwrap();
        let verified =
            SigningService::verify(&signed, service.public_key_b64().unwrap()).unwrap();
        assert_eq!(verified.version, manifest.version);
        assert_eq!(verified.channel, manifest.channel);
    }

    #[test]
    fn test_tampered_manifest_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_fresh_key(dir.path());

        let mut signed = service.sign_bytes(manifest_json().as_bytes()).unwrap();
        let tampered = manifest_json().replace("0.0.5", "0.0.6");
        signed.manifest = serde_json::value::RawValue::from_string(tampered).unwrap();

        let err = SigningService::verify(&signed, service.public_key_b64().unwrap()).unwrap_err();
        assert!(matches!(err, SigningError::Verification(_)));
    }

    #[test]
    fn test_tampered_signature_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_fresh_key(dir.path());

        let mut signed = service.sign_bytes(manifest_json().as_bytes()).unwrap();
        let mut sig = BASE64.decode(&signed.signature).unwrap();
        sig[0] ^= 0x01;
        signed.signature = BASE64.encode(sig);

        let err = SigningService::verify(&signed, service.public_key_b64().unwrap()).unwrap_err();
        assert!(matches!(err, SigningError::Verification(_)));
    }

    #[test]
    fn test_wrong_public_key_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_fresh_key(dir.path());
        let other_dir = tempfile::tempdir().unwrap();
        let other = generate_keypair(other_dir.path()).unwrap();

        let signed = service.sign_bytes(manifest_json().as_bytes()).unwrap();
        let err = SigningService::verify(&signed, &other.public_key_b64).unwrap_err();
        assert!(matches!(err, SigningError::Verification(_)));
    }

    #[test]
    fn test_key_load_accepts_base64_and_raw() {
        let dir = tempfile::tempdir().unwrap();
        let generated = generate_keypair(dir.path()).unwrap();

        // Base64 as written by generate_keypair
        let from_b64 = load_private_key(&generated.private_key_path).unwrap();

        // Raw 64 bytes
        let raw_path = dir.path().join("raw.key");
        std::fs::write(&raw_path, from_b64.to_keypair_bytes()).unwrap();
        let from_raw = load_private_key(&raw_path).unwrap();
        assert_eq!(from_b64.to_keypair_bytes(), from_raw.to_keypair_bytes());
    }

    #[test]
    fn test_key_load_rejects_bad_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.key");
        std::fs::write(&path, b"not a key").unwrap();
        let err = load_private_key(&path).unwrap_err();
        assert!(matches!(err, SigningError::InvalidKeyLength { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let generated = generate_keypair(dir.path()).unwrap();
        let mode = std::fs::metadata(&generated.private_key_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
