//! Prediction outcome and evaluation record types.
//!
//! An [`Evaluation`] is the durable record of one prediction: the validated
//! input, the model output, and when it happened.

use serde::{Deserialize, Serialize};

use super::features::FeaturePayload;

/// Raw output of the scoring model, already thresholded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Probability of being creditworthy (0.0 to 1.0)
    pub probability: f64,

    /// `probability >= threshold` for the model that produced it
    pub creditworthy: bool,
}

impl Prediction {
    /// Build a prediction from a model probability and decision threshold.
    ///
    /// The probability is clamped into `[0, 1]`; a NaN becomes 0.
    #[must_use]
    pub fn new(probability: f64, threshold: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self {
            probability,
            creditworthy: probability >= threshold,
        }
    }

    /// Scorecard value on a 0-100 scale, one decimal.
    #[must_use]
    pub fn credit_score(&self) -> f64 {
        round1(self.probability * 100.0)
    }
}

/// One persisted prediction event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// The validated input
    pub payload: FeaturePayload,

    pub creditworthy: bool,

    pub probability: f64,

    /// `probability * 100`, one decimal
    pub credit_score: f64,

    /// Version string of the model snapshot that scored this payload
    pub model_version: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Evaluation {
    /// Create a new evaluation record stamped with the current time.
    #[must_use]
    pub fn new(payload: FeaturePayload, prediction: Prediction, model_version: impl Into<String>) -> Self {
        Self {
            id: uuid_v4(),
            payload,
            creditworthy: prediction.creditworthy,
            probability: prediction.probability,
            credit_score: prediction.credit_score(),
            model_version: model_version.into(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Round to one decimal place, the precision the dashboard displays.
#[must_use]
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Generate a random UUID v4 string from a CSPRNG.
fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let mut bytes: [u8; 16] = rng.gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
