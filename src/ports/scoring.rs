//! Scoring model port: the trained function behind predictions.
//!
//! This trait abstracts the exported model format from the prediction engine.
//! Training is out of scope; a model is only ever loaded and evaluated.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while loading or evaluating a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model format: {0}")]
    Format(String),

    #[error("Model signature verification failed: {0}")]
    Signature(String),

    #[error("Feature count mismatch: got {got}, expected {expected}")]
    FeatureMismatch { got: usize, expected: usize },

    #[error("Refusing to replace model serial {installed} with older serial {offered}")]
    Rollback { installed: u64, offered: u64 },
}

/// Public description of the installed model snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub threshold: f64,
    pub features: Vec<String>,
    /// Manifest serial, 0 for unsigned models
    pub serial: u64,
}

/// A loaded, immutable scoring function.
///
/// Implementations must be deterministic: the same feature vector always
/// yields the same probability.
pub trait ScoringModel: Send + Sync {
    /// Probability of the positive (creditworthy) class.
    ///
    /// # Arguments
    /// * `features` - Encoded feature vector in `feature_names()` order
    ///
    /// # Errors
    /// Returns `ModelError::FeatureMismatch` if the vector has the wrong length.
    fn score(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Decision threshold: `probability >= threshold` means creditworthy.
    fn threshold(&self) -> f64;

    /// Version label stamped onto every evaluation.
    fn version(&self) -> &str;

    /// Feature names in the order `score` expects them.
    fn feature_names(&self) -> &[String];

    /// Signed manifest serial, used to refuse rollbacks on hot-swap.
    fn serial(&self) -> u64 {
        0
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            version: self.version().to_string(),
            threshold: self.threshold(),
            features: self.feature_names().to_vec(),
            serial: self.serial(),
        }
    }
}
