//! # AgriCredit
//!
//! Creditworthiness prediction and analytics service for smallholder farmers.
//!
//! This crate provides:
//! - Token login against stored Argon2id credentials
//! - Validated, bearer-protected predictions from a signed scoring model
//! - An append-only evaluation log and summary statistics over it
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (features, evaluations, summaries, tokens)
//! - `ports`: Trait definitions for storage and scoring
//! - `adapters`: Concrete implementations (SQLite, exported model, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports
//! - `http`: axum routes over the application services

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod http;
pub mod ports;

pub use domain::{Evaluation, FeaturePayload, Summary};

/// Result type for AgriCredit operations
pub type Result<T> = std::result::Result<T, AgricreditError>;

/// Main error type for AgriCredit
#[derive(Debug, thiserror::Error)]
pub enum AgricreditError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] domain::AuthError),

    #[error("Invalid feature payload: {0}")]
    Validation(#[from] domain::ValidationError),

    #[error("No scoring model is loaded")]
    ModelUnavailable,

    #[error("Model error: {0}")]
    Model(#[from] ports::ModelError),

    #[error("Storage operation failed: {0}")]
    Persistence(#[from] adapters::StorageError),

    #[error("Password hashing failed: {0}")]
    Password(#[from] domain::password::PasswordError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
