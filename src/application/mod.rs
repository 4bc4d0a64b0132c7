//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod analytics;
mod auth;
mod prediction;

pub use analytics::{AnalyticsAggregator, MAX_PAGE_SIZE};
pub use auth::AuthGateway;
pub use prediction::{PredictionEngine, PredictionOutcome};
