//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types with no I/O. Validation, scoring
//! arithmetic on results, and token encoding all live here.

pub mod advice;
mod auth;
mod evaluation;
pub mod features;
pub mod password;
mod summary;
pub mod token;

pub use auth::{AccessToken, AuthError, Claims, Credential, Permission, Role, UnknownRole};
pub use evaluation::{round1, Evaluation, Prediction};
pub use features::{
    validate, Category, EducationLevel, FeaturePayload, FinancialAccess, Gender, PhoneType,
    ValidationError, ValidationReason, FEATURE_NAMES,
};
pub use summary::{BreakdownRow, Dimension, Summary, Tally, UnknownDimension};
pub use token::TokenKey;
