//! Process configuration, read once at startup.
//!
//! Plain settings come from `AGRICREDIT_*` environment variables with
//! defaults. Secrets are read from a secure source, highest precedence first:
//!
//! - `<VAR>_FD` (an already-open file descriptor, read once and closed)
//! - `<VAR>_FILE` (a file path)
//! - `/run/secrets/<name>` (Docker/Compose secret default)
//! - `<VAR>` itself, in debug builds only
//!
//! In release builds, secrets in plain environment variables are refused.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderValue;
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::VerifyingKey;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::domain::TokenKey;

/// Seed for the access token signing key (base64, 32 bytes).
pub const TOKEN_SEED: Secret = Secret {
    var: "AGRICREDIT_TOKEN_SEED_B64",
    docker_name: "agricredit_token_seed_b64",
};

/// Public key that model manifests must be signed with (base64, 32 bytes).
pub const MODEL_PUBKEY: Secret = Secret {
    var: "AGRICREDIT_MODEL_PUBKEY_B64",
    docker_name: "agricredit_model_pubkey_b64",
};

/// Private seed used by the `sign_model` tool (base64, 32 bytes).
pub const MODEL_SIGNING_SEED: Secret = Secret {
    var: "AGRICREDIT_MODEL_SIGNING_KEY_B64",
    docker_name: "agricredit_model_signing_key_b64",
};

const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_PATH: &str = "agricredit.db";
const DEFAULT_MODEL_PATH: &str = "models";
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error("Missing secret: provide {0}_FD or {0}_FILE (or mount /run/secrets/{1})")]
    MissingSecret(&'static str, &'static str),

    #[error("Failed reading secret {var}: {source}")]
    Io {
        var: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(var: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// A named secret and where to look for it.
#[derive(Debug, Clone, Copy)]
pub struct Secret {
    pub var: &'static str,
    pub docker_name: &'static str,
}

impl Secret {
    /// Read the secret from the process environment.
    ///
    /// # Returns
    /// `None` if no source is configured.
    ///
    /// # Errors
    /// Returns error if a configured source cannot be read or is empty.
    pub fn read(&self) -> Result<Option<Zeroizing<String>>, ConfigError> {
        self.read_with(|k| std::env::var(k).ok(), Path::new("/run/secrets"))
    }

    /// Like [`Secret::read`] but fails when the secret is absent.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingSecret` if no source is configured.
    pub fn require(&self) -> Result<Zeroizing<String>, ConfigError> {
        self.read()?
            .ok_or(ConfigError::MissingSecret(self.var, self.docker_name))
    }

    fn read_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
        secrets_dir: &Path,
    ) -> Result<Option<Zeroizing<String>>, ConfigError> {
        let fd_var = format!("{}_FD", self.var);
        let file_var = format!("{}_FILE", self.var);

        #[cfg(unix)]
        if let Some(fd_str) = lookup(&fd_var) {
            use std::io::Read;
            use std::os::unix::io::FromRawFd;

            let fd: i32 = fd_str
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(&fd_var, "not a file descriptor"))?;
            if fd <= 2 {
                return Err(ConfigError::invalid(&fd_var, "refusing to read a stdio descriptor"));
            }
            // SAFETY: We take ownership of the FD for one-time secret read and close it.
            let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
            let mut buf = Zeroizing::new(String::new());
            file.read_to_string(&mut buf)
                .map_err(|source| ConfigError::Io { var: fd_var.clone(), source })?;
            return non_empty(&fd_var, &buf).map(Some);
        }

        if let Some(path) = lookup(&file_var) {
            let content = Zeroizing::new(
                std::fs::read_to_string(path.trim())
                    .map_err(|source| ConfigError::Io { var: file_var.clone(), source })?,
            );
            return non_empty(&file_var, &content).map(Some);
        }

        let docker_path = secrets_dir.join(self.docker_name);
        if docker_path.exists() {
            let content = Zeroizing::new(
                std::fs::read_to_string(&docker_path)
                    .map_err(|source| ConfigError::Io { var: self.var.to_string(), source })?,
            );
            return non_empty(self.var, &content).map(Some);
        }

        if cfg!(debug_assertions) {
            if let Some(v) = lookup(self.var) {
                return non_empty(self.var, &v).map(Some);
            }
        }

        Ok(None)
    }
}

fn non_empty(var: &str, raw: &str) -> Result<Zeroizing<String>, ConfigError> {
    let secret = raw.trim_end_matches(['\n', '\r']);
    if secret.trim().is_empty() {
        return Err(ConfigError::invalid(var, "secret is empty"));
    }
    Ok(Zeroizing::new(secret.to_string()))
}

/// Decode a base64 Ed25519 seed.
///
/// # Errors
/// Returns error unless the value decodes to exactly 32 bytes.
pub fn decode_seed_b64(var: &str, b64: &str) -> Result<[u8; 32], ConfigError> {
    let mut raw = general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| ConfigError::invalid(var, format!("invalid base64: {e}")))?;
    let result = <[u8; 32]>::try_from(raw.as_slice())
        .map_err(|_| ConfigError::invalid(var, format!("expected 32 bytes, got {}", raw.len())));
    raw.zeroize();
    result
}

/// Decode a base64 Ed25519 public key.
///
/// # Errors
/// Returns error if the value is not a valid 32-byte verifying key.
pub fn decode_pubkey_b64(var: &str, b64: &str) -> Result<VerifyingKey, ConfigError> {
    let bytes = decode_seed_b64(var, b64)?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| ConfigError::invalid(var, "not a valid Ed25519 public key"))
}

/// Runtime configuration for the service.
#[derive(Debug)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    /// Directory holding `model.json`, `manifest.json` and `model.sig`
    pub model_path: PathBuf,
    pub token_ttl_secs: i64,
    pub request_timeout: Duration,
    /// Debug builds only; always false in release builds
    pub allow_unsigned_models: bool,
    /// `None` allows any origin
    pub cors_origin: Option<HeaderValue>,
    pub token_key: TokenKey,
    pub model_verifying_key: Option<VerifyingKey>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns error on unparsable values or missing release-mode secrets.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |k: &str| std::env::var(k).ok();
        let token_seed = TOKEN_SEED.read()?;
        let model_pubkey = MODEL_PUBKEY.read()?;
        Self::build(lookup, token_seed, model_pubkey)
    }

    fn build(
        lookup: impl Fn(&str) -> Option<String>,
        token_seed: Option<Zeroizing<String>>,
        model_pubkey: Option<Zeroizing<String>>,
    ) -> Result<Self, ConfigError> {
        let bind: SocketAddr = parse_or(
            &lookup,
            "AGRICREDIT_BIND",
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        )?;
        let db_path = lookup("AGRICREDIT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let model_path = lookup("AGRICREDIT_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));

        let token_ttl_secs: i64 = parse_or(&lookup, "AGRICREDIT_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        if token_ttl_secs <= 0 {
            return Err(ConfigError::invalid("AGRICREDIT_TOKEN_TTL_SECS", "must be positive"));
        }
        let timeout_secs: u64 = parse_or(
            &lookup,
            "AGRICREDIT_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::invalid("AGRICREDIT_REQUEST_TIMEOUT_SECS", "must be positive"));
        }

        let allow_unsigned_models = cfg!(debug_assertions)
            && lookup("AGRICREDIT_ALLOW_UNSIGNED_MODELS")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
                .unwrap_or(false);

        let cors_origin = lookup("AGRICREDIT_CORS_ORIGIN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && v != "*")
            .map(|v| {
                HeaderValue::from_str(&v)
                    .map_err(|_| ConfigError::invalid("AGRICREDIT_CORS_ORIGIN", "not a valid header value"))
            })
            .transpose()?;

        let token_key = match token_seed {
            Some(b64) => TokenKey::from_seed(decode_seed_b64(TOKEN_SEED.var, &b64)?),
            None if cfg!(debug_assertions) => {
                tracing::warn!(
                    "No token signing key configured; generated an ephemeral key. \
                     Tokens will not survive a restart."
                );
                TokenKey::generate()
            }
            None => return Err(ConfigError::MissingSecret(TOKEN_SEED.var, TOKEN_SEED.docker_name)),
        };

        let model_verifying_key = model_pubkey
            .map(|b64| decode_pubkey_b64(MODEL_PUBKEY.var, &b64))
            .transpose()?;

        Ok(Self {
            bind,
            db_path,
            model_path,
            token_ttl_secs,
            request_timeout: Duration::from_secs(timeout_secs),
            allow_unsigned_models,
            cors_origin,
            token_key,
            model_verifying_key,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, e.to_string())),
        None => {
            tracing::info!("{var} not set, using default {default:?}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    fn seed_b64(byte: u8) -> Zeroizing<String> {
        Zeroizing::new(general_purpose::STANDARD.encode([byte; 32]))
    }

    #[test]
    fn test_defaults() {
        let config = Config::build(env(&[]), Some(seed_b64(1)), None).expect("Should build");
        assert_eq!(config.bind, "0.0.0.0:8000".parse().expect("addr"));
        assert_eq!(config.db_path, PathBuf::from("agricredit.db"));
        assert_eq!(config.model_path, PathBuf::from("models"));
        assert_eq!(config.token_ttl_secs, 3600);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.allow_unsigned_models);
        assert!(config.cors_origin.is_none());
        assert!(config.model_verifying_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let lookup = env(&[
            ("AGRICREDIT_BIND", "127.0.0.1:9000"),
            ("AGRICREDIT_TOKEN_TTL_SECS", "60"),
            ("AGRICREDIT_CORS_ORIGIN", "https://dash.example"),
            ("AGRICREDIT_ALLOW_UNSIGNED_MODELS", "true"),
        ]);
        let config = Config::build(lookup, Some(seed_b64(1)), None).expect("Should build");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.token_ttl_secs, 60);
        assert_eq!(
            config.cors_origin.as_ref().map(HeaderValue::as_bytes),
            Some(&b"https://dash.example"[..])
        );
        assert_eq!(config.allow_unsigned_models, cfg!(debug_assertions));
    }

    #[test]
    fn test_invalid_values() {
        for (var, value) in [
            ("AGRICREDIT_BIND", "not-an-addr"),
            ("AGRICREDIT_TOKEN_TTL_SECS", "-5"),
            ("AGRICREDIT_REQUEST_TIMEOUT_SECS", "0"),
            ("AGRICREDIT_CORS_ORIGIN", "https://bad\norigin"),
        ] {
            let err = Config::build(env(&[(var, value)]), Some(seed_b64(1)), None)
                .expect_err("Should reject");
            assert!(matches!(err, ConfigError::Invalid { .. }), "{var}={value}");
        }
    }

    #[test]
    fn test_token_seed_is_deterministic() {
        let a = Config::build(env(&[]), Some(seed_b64(9)), None).expect("Should build");
        let b = Config::build(env(&[]), Some(seed_b64(9)), None).expect("Should build");
        assert_eq!(a.token_key.fingerprint, b.token_key.fingerprint);
    }

    #[test]
    fn test_short_seed_rejected() {
        let short = Zeroizing::new(general_purpose::STANDARD.encode([1u8; 16]));
        assert!(Config::build(env(&[]), Some(short), None).is_err());
    }

    #[test]
    fn test_secret_file_precedence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("seed");
        std::fs::write(&file, "from-file\n").expect("write");
        std::fs::write(dir.path().join(TOKEN_SEED.docker_name), "from-docker").expect("write");

        let path = file.to_string_lossy().into_owned();
        let lookup = env(&[("AGRICREDIT_TOKEN_SEED_B64_FILE", path.as_str())]);
        let secret = TOKEN_SEED
            .read_with(lookup, dir.path())
            .expect("Should read")
            .expect("Should exist");
        assert_eq!(secret.as_str(), "from-file");

        let secret = TOKEN_SEED
            .read_with(env(&[]), dir.path())
            .expect("Should read")
            .expect("Should exist");
        assert_eq!(secret.as_str(), "from-docker");
    }

    #[test]
    fn test_missing_secret() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(TOKEN_SEED
            .read_with(env(&[]), dir.path())
            .expect("Should read")
            .is_none());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(MODEL_PUBKEY.docker_name), "\n").expect("write");
        assert!(MODEL_PUBKEY.read_with(env(&[]), dir.path()).is_err());
    }
}
