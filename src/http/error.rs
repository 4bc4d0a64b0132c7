use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{AuthError, ValidationError, ValidationReason};
use crate::ports::ModelError;
use crate::AgricreditError;

/// Errors as seen by HTTP clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(AuthError),

    #[error("{0}")]
    Forbidden(AuthError),

    #[error("{0}")]
    Validation(ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Prediction model is not available")]
    ModelUnavailable,

    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<ValidationReason>,
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Forbidden(_) => Self::Forbidden(e),
            other => Self::Unauthorized(other),
        }
    }
}

impl From<AgricreditError> for ApiError {
    fn from(e: AgricreditError) -> Self {
        match e {
            AgricreditError::Auth(e) => e.into(),
            AgricreditError::Validation(e) => Self::Validation(e),
            AgricreditError::ModelUnavailable => Self::ModelUnavailable,
            AgricreditError::Model(e @ ModelError::Rollback { .. }) => Self::Conflict(e.to_string()),
            other => {
                tracing::error!("Request failed: {other}");
                Self::Internal
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        tracing::error!("Blocking task failed: {e}");
        Self::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (field, reason) = match &self {
            ApiError::Validation(v) => (Some(v.field), Some(v.reason)),
            _ => (None, None),
        };
        let body = ErrorBody {
            detail: self.to_string(),
            field,
            reason,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
