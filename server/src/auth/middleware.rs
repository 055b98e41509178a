//! Authentication extractor.
//!
//! When `AUTH_SECRET` is configured, protected routes require it as a
//! Bearer token. Without a secret every request is admitted.

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::error::AppError;
use crate::AppState;

/// Marker for a request that passed the bearer check.
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

impl FromRequestParts<AppState> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.auth_secret.as_deref() else {
            return Ok(Authorized);
        };

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim);

        match token {
            Some(token) if token == secret => Ok(Authorized),
            Some(_) => {
                tracing::warn!("rejected request with wrong bearer token");
                Err(AppError::Unauthorized)
            }
            None => Err(AppError::Unauthorized),
        }
    }
}
