//! Prediction engine: scores validated payloads and records every result.
//!
//! This service coordinates:
//! - The installed model snapshot (hot-swappable)
//! - Scoring and thresholding
//! - Appending the evaluation to the log before answering

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::domain::advice::improvement_advice;
use crate::domain::{Evaluation, FeaturePayload, Prediction};
use crate::ports::{EvaluationLog, ModelError, ModelInfo, ScoringModel};
use crate::AgricreditError;

/// What a caller gets back for one prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutcome {
    pub creditworthy: bool,
    pub probability: f64,
    pub credit_score: f64,
    pub advice: Vec<String>,
    pub evaluation_id: String,
}

/// Service for running predictions.
///
/// # Model Snapshot
///
/// The model lives behind `RwLock<Option<Arc<M>>>`. A prediction clones the
/// `Arc` and releases the lock before scoring, so a concurrent hot-swap never
/// changes the model under an in-flight request.
pub struct PredictionEngine<M, L>
where
    M: ScoringModel,
    L: EvaluationLog,
{
    model: RwLock<Option<Arc<M>>>,
    log: Arc<L>,
}

impl<M, L> PredictionEngine<M, L>
where
    M: ScoringModel,
    L: EvaluationLog,
    L::Error: Into<crate::adapters::StorageError>,
{
    /// Create an engine with no model installed.
    pub fn new(log: Arc<L>) -> Self {
        Self {
            model: RwLock::new(None),
            log,
        }
    }

    /// The current snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<M>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Describe the installed model.
    ///
    /// # Errors
    /// Returns `AgricreditError::ModelUnavailable` if none is installed.
    pub fn model_info(&self) -> Result<ModelInfo, AgricreditError> {
        self.snapshot()
            .map(|m| m.info())
            .ok_or(AgricreditError::ModelUnavailable)
    }

    /// Atomically replace the model snapshot.
    ///
    /// # Errors
    /// Returns `ModelError::Rollback` if `model` carries an older manifest
    /// serial than the installed one.
    pub fn install(&self, model: M) -> Result<ModelInfo, AgricreditError> {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slot.as_ref() {
            if model.serial() < current.serial() {
                return Err(ModelError::Rollback {
                    installed: current.serial(),
                    offered: model.serial(),
                }
                .into());
            }
        }

        let info = model.info();
        *slot = Some(Arc::new(model));
        tracing::info!(
            "Installed model {} (serial {}, threshold {})",
            info.version,
            info.serial,
            info.threshold
        );
        Ok(info)
    }

    /// Remove the installed model; predictions fail until the next install.
    pub fn unload(&self) {
        let previous = self
            .model
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(m) = previous {
            tracing::warn!("Unloaded model {}", m.version());
        }
    }

    /// Score a payload and record the evaluation.
    ///
    /// Deterministic for a fixed payload and model snapshot.
    ///
    /// # Errors
    /// Returns `ModelUnavailable` with no snapshot installed, a model error if
    /// scoring fails, and `Persistence` if the log append fails. No outcome is
    /// returned unless the evaluation was committed.
    pub fn predict(&self, payload: FeaturePayload) -> Result<PredictionOutcome, AgricreditError> {
        let model = self.snapshot().ok_or(AgricreditError::ModelUnavailable)?;

        let probability = model.score(&payload.to_vec())?;
        let prediction = Prediction::new(probability, model.threshold());
        let evaluation = Evaluation::new(payload, prediction, model.version());

        let evaluation_id = self.log.append(&evaluation).map_err(|e| {
            let e: crate::adapters::StorageError = e.into();
            tracing::error!("Failed to record evaluation {}: {e}", evaluation.id);
            AgricreditError::Persistence(e)
        })?;

        tracing::info!(
            "Prediction {}: creditworthy={}, score={:.1}, model={}",
            evaluation_id,
            evaluation.creditworthy,
            evaluation.credit_score,
            evaluation.model_version
        );

        Ok(PredictionOutcome {
            creditworthy: evaluation.creditworthy,
            probability: evaluation.probability,
            credit_score: evaluation.credit_score,
            advice: improvement_advice(&evaluation.payload, evaluation.credit_score),
            evaluation_id,
        })
    }
}
