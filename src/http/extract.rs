use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};

use super::{error::ApiError, state::AppState};
use crate::domain::{AuthError, Claims};

/// Claims of a verified `Authorization: Bearer <token>` header.
pub struct Bearer(pub Claims);

impl FromRequestParts<Arc<AppState>> for Bearer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?;
        let token = bearer_token(header.to_str().map_err(|_| AuthError::InvalidToken)?)
            .ok_or(AuthError::InvalidToken)?;

        let claims = state.auth.authenticate(token).inspect_err(|e| {
            tracing::debug!("Bearer token rejected: {e}");
        })?;
        Ok(Bearer(claims))
    }
}

/// Token part of an `Authorization` value. The scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
