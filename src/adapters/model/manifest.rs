//! Signed model manifests.
//!
//! A model directory is trusted only through `manifest.json`, which lists the
//! SHA-256 of every bound file, and `model.sig`, a detached Ed25519 signature
//! over the exact manifest bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ports::ModelError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "model.sig";
pub const MODEL_FILE: &str = "model.json";

/// Allowed clock skew for `created_at`, in seconds.
const MAX_FUTURE_SKEW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Monotonic serial number, checked on hot-swap
    pub serial: u64,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    /// Random nonce (base64, 16 bytes)
    pub nonce_b64: String,
    /// Relative file name -> SHA-256 hex
    pub files: BTreeMap<String, String>,
}

impl Manifest {
    /// Build a manifest binding `files` (relative to `dir`).
    ///
    /// # Errors
    /// Returns error if a file cannot be read.
    pub fn for_files(dir: &Path, files: &[&str], serial: u64, created_at: i64) -> Result<Self, ModelError> {
        let mut map = BTreeMap::new();
        for rel in files {
            let bytes = fs::read(dir.join(rel))?;
            map.insert((*rel).to_string(), sha256_hex(&bytes));
        }

        let mut nonce = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        Ok(Self {
            version: 1,
            serial,
            created_at,
            nonce_b64: general_purpose::STANDARD.encode(nonce),
            files: map,
        })
    }

    /// Serialize and sign the manifest into `dir`.
    ///
    /// # Errors
    /// Returns error if the manifest or signature cannot be written.
    pub fn write_signed(&self, dir: &Path, signing_key: &SigningKey) -> Result<(), ModelError> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| ModelError::Format(format!("Failed to serialize manifest: {e}")))?;
        fs::write(dir.join(MANIFEST_FILE), &bytes)?;

        let signature: Signature = signing_key.sign(&bytes);
        fs::write(dir.join(SIGNATURE_FILE), signature.to_bytes())?;
        Ok(())
    }
}

/// Check whether `dir` carries a manifest and signature at all.
#[must_use]
pub fn is_signed(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).exists() && dir.join(SIGNATURE_FILE).exists()
}

/// A verified manifest together with the exact `model.json` bytes it hashed.
///
/// Callers must parse `model` rather than re-reading the file, which may
/// have changed since it was hashed.
#[derive(Debug)]
pub struct Verified {
    pub manifest: Manifest,
    pub model: Vec<u8>,
}

/// Verify the manifest in `dir` against `key` and check every bound file.
///
/// # Errors
/// Returns `ModelError::Signature` on any signature, freshness or hash failure.
pub fn verify(dir: &Path, key: &VerifyingKey, now: i64) -> Result<Verified, ModelError> {
    let sig_bytes = fs::read(dir.join(SIGNATURE_FILE))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::Signature("Invalid signature length (expected 64 bytes)".into()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    let manifest_bytes = fs::read(dir.join(MANIFEST_FILE))?;
    key.verify(&manifest_bytes, &signature)
        .map_err(|_| ModelError::Signature("Invalid model signature".into()))?;

    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| ModelError::Signature(format!("Invalid manifest.json format: {e}")))?;
    if manifest.version != 1 {
        return Err(ModelError::Signature(format!(
            "Unsupported manifest version: {}",
            manifest.version
        )));
    }

    let nonce = general_purpose::STANDARD
        .decode(manifest.nonce_b64.trim())
        .map_err(|e| ModelError::Signature(format!("Invalid nonce base64: {e}")))?;
    if nonce.len() != 16 {
        return Err(ModelError::Signature("nonce must decode to exactly 16 bytes".into()));
    }

    if manifest.created_at > now + MAX_FUTURE_SKEW_SECS {
        return Err(ModelError::Signature("manifest created_at is in the future".into()));
    }

    if !manifest.files.contains_key(MODEL_FILE) {
        return Err(ModelError::Signature(format!("manifest.json must bind {MODEL_FILE}")));
    }

    let mut model = None;
    for (rel, expected_hex) in &manifest.files {
        if rel.contains("..") || Path::new(rel).is_absolute() {
            return Err(ModelError::Signature(format!("Refusing manifest path {rel}")));
        }
        let bytes = fs::read(dir.join(rel)).map_err(|e| {
            ModelError::Signature(format!("Manifest references missing/unreadable file {rel}: {e}"))
        })?;
        if !constant_time_eq_str(&sha256_hex(&bytes), expected_hex) {
            return Err(ModelError::Signature(format!("File hash mismatch for {rel}")));
        }
        if rel == MODEL_FILE {
            model = Some(bytes);
        }
    }

    let model = model
        .ok_or_else(|| ModelError::Signature(format!("manifest.json must bind {MODEL_FILE}")))?;
    Ok(Verified { manifest, model })
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

// Constant-time compare for ASCII strings (used for SHA-256 hex digests).
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |diff, (x, y)| diff | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NOW: i64 = 1_750_000_000;

    fn signed_dir(key: &SigningKey, created_at: i64) -> tempfile::TempDir {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join(MODEL_FILE), br#"{"version":"x"}"#).expect("write model");
        Manifest::for_files(temp.path(), &[MODEL_FILE], 7, created_at)
            .expect("manifest")
            .write_signed(temp.path(), key)
            .expect("sign");
        temp
    }

    #[test]
    fn test_verify_signed_dir() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let temp = signed_dir(&key, NOW);
        assert!(is_signed(temp.path()));

        let verified = verify(temp.path(), &key.verifying_key(), NOW).expect("Should verify");
        assert_eq!(verified.manifest.serial, 7);
        assert!(verified.manifest.files.contains_key(MODEL_FILE));
    }

    #[test]
    fn test_verified_bytes_outlive_file_swap() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let temp = signed_dir(&key, NOW);
        let verified = verify(temp.path(), &key.verifying_key(), NOW).expect("Should verify");

        fs::write(temp.path().join(MODEL_FILE), br#"{"version":"evil"}"#).expect("write");
        assert_eq!(verified.model, br#"{"version":"x"}"#);
        assert_eq!(
            sha256_hex(&verified.model),
            verified.manifest.files[MODEL_FILE]
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let other = SigningKey::from_bytes(&[4u8; 32]);
        let temp = signed_dir(&key, NOW);
        assert!(matches!(
            verify(temp.path(), &other.verifying_key(), NOW),
            Err(ModelError::Signature(_))
        ));
    }

    #[test]
    fn test_tampered_model_rejected() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let temp = signed_dir(&key, NOW);
        fs::write(temp.path().join(MODEL_FILE), br#"{"version":"evil"}"#).expect("write");

        let err = verify(temp.path(), &key.verifying_key(), NOW).expect_err("must fail");
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn test_future_manifest_rejected() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let temp = signed_dir(&key, NOW + 3600);
        let err = verify(temp.path(), &key.verifying_key(), NOW).expect_err("must fail");
        assert!(err.to_string().contains("future"));
    }

    #[test]
    fn test_unsigned_dir() {
        let temp = tempdir().expect("tempdir");
        assert!(!is_signed(temp.path()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq_str("abc", "abc"));
        assert!(!constant_time_eq_str("abc", "abd"));
        assert!(!constant_time_eq_str("abc", "ab"));
    }
}
