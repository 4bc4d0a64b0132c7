//! Model adapter: logistic scorecard loaded from an exported `model.json`.
//!
//! The training pipeline exports a standardised logistic regression:
//!
//! ```text
//! z = intercept + sum_i coefficients[i] * (x[i] - scaler_mean[i]) / scaler_scale[i]
//! p = 1 / (1 + exp(-z))
//! ```
//!
//! # Security
//!
//! - Model directories are verified via Ed25519 signatures (see [`manifest`])
//! - In release builds, ALL models MUST have valid signatures
//! - Unsigned loading is a debug-build opt-in for local testing

pub mod manifest;

use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::domain::FEATURE_NAMES;
use crate::ports::{ModelError, ScoringModel};

/// Exported model parameters, as written by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedModel {
    pub version: String,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub scaler_mean: Vec<f64>,
    pub scaler_scale: Vec<f64>,
    pub threshold: f64,
}

/// A validated, immutable logistic model.
#[derive(Debug, Clone)]
pub struct LinearModel {
    params: ExportedModel,
    serial: u64,
}

impl LinearModel {
    /// Validate exported parameters against the service's feature layout.
    ///
    /// # Errors
    /// Returns `ModelError::Format` on inconsistent or non-finite parameters.
    pub fn from_exported(params: ExportedModel, serial: u64) -> Result<Self, ModelError> {
        let n = params.feature_names.len();
        if params.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ModelError::Format(format!(
                "feature_names must be {FEATURE_NAMES:?}, got {:?}",
                params.feature_names
            )));
        }
        if params.coefficients.len() != n
            || params.scaler_mean.len() != n
            || params.scaler_scale.len() != n
        {
            return Err(ModelError::Format(
                "Model parameter lengths do not match feature_names length".into(),
            ));
        }

        let all_finite = params
            .coefficients
            .iter()
            .chain(&params.scaler_mean)
            .chain(&params.scaler_scale)
            .chain(std::iter::once(&params.intercept))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ModelError::Format("Model parameters must be finite".into()));
        }
        if params.scaler_scale.iter().any(|s| *s == 0.0) {
            return Err(ModelError::Format("scaler_scale must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&params.threshold) {
            return Err(ModelError::Format(format!(
                "threshold must be within [0, 1], got {}",
                params.threshold
            )));
        }
        if params.version.trim().is_empty() {
            return Err(ModelError::Format("version must not be empty".into()));
        }

        Ok(Self { params, serial })
    }

    fn logit(&self, features: &[f64]) -> f64 {
        let p = &self.params;
        features
            .iter()
            .zip(&p.coefficients)
            .zip(p.scaler_mean.iter().zip(&p.scaler_scale))
            .fold(p.intercept, |z, ((x, coef), (mean, scale))| {
                z + coef * (x - mean) / scale
            })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ScoringModel for LinearModel {
    fn score(&self, features: &[f64]) -> Result<f64, ModelError> {
        let expected = self.params.feature_names.len();
        if features.len() != expected {
            return Err(ModelError::FeatureMismatch {
                got: features.len(),
                expected,
            });
        }
        Ok(sigmoid(self.logit(features)))
    }

    fn threshold(&self) -> f64 {
        self.params.threshold
    }

    fn version(&self) -> &str {
        &self.params.version
    }

    fn feature_names(&self) -> &[String] {
        &self.params.feature_names
    }

    fn serial(&self) -> u64 {
        self.serial
    }
}

/// Loads models from a directory, enforcing the signature policy.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    dir: PathBuf,
    verifying_key: Option<VerifyingKey>,
    allow_unsigned: bool,
}

impl ModelLoader {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, verifying_key: Option<VerifyingKey>, allow_unsigned: bool) -> Self {
        Self {
            dir: dir.into(),
            verifying_key,
            // SECURITY: unsigned models can never be loaded by a release build.
            allow_unsigned: allow_unsigned && cfg!(debug_assertions),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and validate the model.
    ///
    /// # Errors
    /// Returns error if files are missing, the signature does not verify, or
    /// the parameters are invalid.
    pub fn load(&self) -> Result<LinearModel, ModelError> {
        let model_path = self.dir.join(manifest::MODEL_FILE);
        let (bytes, serial) = if manifest::is_signed(&self.dir) {
            let key = self.verifying_key.as_ref().ok_or_else(|| {
                ModelError::Signature("No model verifying key configured".into())
            })?;
            let verified = manifest::verify(&self.dir, key, chrono::Utc::now().timestamp())?;
            tracing::info!(
                "Model signature and hashes verified (serial {})",
                verified.manifest.serial
            );
            (verified.model, verified.manifest.serial)
        } else if self.allow_unsigned {
            tracing::warn!(
                "Loading UNSIGNED model from {:?}. This is only allowed in debug builds for testing.",
                self.dir
            );
            (fs::read(&model_path)?, 0)
        } else {
            tracing::error!(
                "Model signature not found in {:?}. Signed models are required.",
                self.dir
            );
            return Err(ModelError::Signature("Model signature required".into()));
        };

        let params: ExportedModel =
            serde_json::from_slice(&bytes).map_err(|e| ModelError::Format(e.to_string()))?;
        let model = LinearModel::from_exported(params, serial)?;

        tracing::info!(
            "Loaded model {} from {:?} (threshold={}, n_features={})",
            model.version(),
            model_path,
            model.threshold(),
            model.feature_names().len()
        );
        Ok(model)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::features::tests::sample_payload;
    use ed25519_dalek::SigningKey;
    use tempfile::tempdir;

    /// A small model that favours financial access and experience.
    pub(crate) fn exported(version: &str, threshold: f64) -> ExportedModel {
        ExportedModel {
            version: version.to_string(),
            feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            coefficients: vec![0.1, 0.3, 0.4, 0.3, 0.8, 0.5, 0.3, 0.3, 0.4, -0.2, 0.0],
            intercept: -0.2,
            scaler_mean: vec![38.0, 1.5, 2.0, 1.0, 1.0, 8.0, 0.5, 0.5, 0.4, 3.0, 0.5],
            scaler_scale: vec![10.0, 1.0, 1.5, 0.8, 0.8, 6.0, 0.5, 0.5, 0.5, 2.0, 0.5],
            threshold,
        }
    }

    pub(crate) fn linear(version: &str, threshold: f64) -> LinearModel {
        LinearModel::from_exported(exported(version, threshold), 0).expect("valid model")
    }

    fn write_model(dir: &Path, model: &ExportedModel) {
        let json = serde_json::to_string(model).expect("serialize model");
        fs::write(dir.join(manifest::MODEL_FILE), json).expect("write model");
    }

    #[test]
    fn test_score_is_probability() {
        let model = linear("v1", 0.5);
        let p = model.score(&sample_payload().to_vec()).expect("Should score");
        assert!((0.0..=1.0).contains(&p));
        assert_eq!(p, model.score(&sample_payload().to_vec()).expect("Should score"));
    }

    #[test]
    fn test_score_at_mean_is_intercept() {
        let params = exported("v1", 0.5);
        let mean = params.scaler_mean.clone();
        let model = LinearModel::from_exported(params, 0).expect("valid");
        let p = model.score(&mean).expect("Should score");
        assert!((p - sigmoid(-0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_feature_mismatch() {
        let model = linear("v1", 0.5);
        assert!(matches!(
            model.score(&[1.0, 2.0]),
            Err(ModelError::FeatureMismatch { got: 2, expected: 11 })
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut p = exported("v1", 0.5);
        p.scaler_scale[3] = 0.0;
        assert!(LinearModel::from_exported(p, 0).is_err());

        let mut p = exported("v1", 0.5);
        p.coefficients.pop();
        assert!(LinearModel::from_exported(p, 0).is_err());

        let mut p = exported("v1", 0.5);
        p.feature_names.swap(0, 1);
        assert!(LinearModel::from_exported(p, 0).is_err());

        assert!(LinearModel::from_exported(exported("v1", 1.5), 0).is_err());
        assert!(LinearModel::from_exported(exported(" ", 0.5), 0).is_err());
    }

    #[test]
    fn test_load_signed_model() {
        let temp = tempdir().expect("tempdir");
        write_model(temp.path(), &exported("signed-v2", 0.4));

        let key = SigningKey::from_bytes(&[11u8; 32]);
        let now = chrono::Utc::now().timestamp();
        manifest::Manifest::for_files(temp.path(), &[manifest::MODEL_FILE], 42, now)
            .expect("manifest")
            .write_signed(temp.path(), &key)
            .expect("sign");

        let loader = ModelLoader::new(temp.path(), Some(key.verifying_key()), false);
        let model = loader.load().expect("Should load signed model");
        assert_eq!(model.version(), "signed-v2");
        assert_eq!(model.serial(), 42);
        assert_eq!(model.info().threshold, 0.4);
    }

    #[test]
    fn test_signed_model_without_key_rejected() {
        let temp = tempdir().expect("tempdir");
        write_model(temp.path(), &exported("v1", 0.5));
        let key = SigningKey::from_bytes(&[11u8; 32]);
        manifest::Manifest::for_files(temp.path(), &[manifest::MODEL_FILE], 1, 0)
            .expect("manifest")
            .write_signed(temp.path(), &key)
            .expect("sign");

        let loader = ModelLoader::new(temp.path(), None, true);
        assert!(matches!(loader.load(), Err(ModelError::Signature(_))));
    }

    #[test]
    fn test_unsigned_policy() {
        let temp = tempdir().expect("tempdir");
        write_model(temp.path(), &exported("dev", 0.5));

        let strict = ModelLoader::new(temp.path(), None, false);
        assert!(matches!(strict.load(), Err(ModelError::Signature(_))));

        let relaxed = ModelLoader::new(temp.path(), None, true);
        if cfg!(debug_assertions) {
            let model = relaxed.load().expect("Should load unsigned in debug");
            assert_eq!(model.serial(), 0);
        } else {
            assert!(relaxed.load().is_err());
        }
    }

    #[test]
    fn test_missing_model_file() {
        let temp = tempdir().expect("tempdir");
        let loader = ModelLoader::new(temp.path(), None, true);
        assert!(loader.load().is_err());
    }
}
