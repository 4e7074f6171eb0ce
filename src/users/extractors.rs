use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::error::UserError;
use crate::{auth::AuthError, state::AppState};

/// Bearer token from the `Authorization` header, already validated by the
/// auth service.
pub struct AuthUser {
    pub user_id: Uuid,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = UserError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        else {
            warn!("missing Authorization header");
            return Err(UserError::InvalidToken);
        };

        let Some(token) = auth.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
        else {
            warn!("invalid auth scheme");
            return Err(UserError::InvalidToken);
        };

        match state.auth.validate_token(token).await {
            Ok(user_id) => Ok(AuthUser {
                user_id,
                token: token.to_string(),
            }),
            Err(AuthError::Transport(e)) => {
                Err(UserError::Internal(e.context("validate bearer token")))
            }
            Err(e) => {
                warn!(error = %e, "bearer token rejected");
                Err(UserError::InvalidToken)
            }
        }
    }
}
