//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `sqlite`: SQLite for credentials and the evaluation log
//! - `model`: exported logistic model with signed manifests
//! - `sanitize`: secret/PII filtering for logs

pub mod model;
pub mod sanitize;
pub mod sqlite;

// Re-export storage error for lib.rs
pub use sqlite::StorageError;
