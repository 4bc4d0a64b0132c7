//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (SQLite, exported model
//! files, etc.).

mod credential_store;
mod evaluation_log;
mod scoring;

pub use credential_store::CredentialStore;
pub use evaluation_log::{EvaluationLog, EvaluationPage, EvaluationScan};
pub use scoring::{ModelError, ModelInfo, ScoringModel};
