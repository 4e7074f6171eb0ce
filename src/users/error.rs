use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use super::repo::StoreError;

/// Failures surfaced by the user service.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user not found")]
    UserNotFound,
    #[error("email already exists")]
    EmailAlreadyExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidProfileData(String),
    #[error("email verification failed")]
    EmailVerificationFailed,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("logout failed")]
    LogoutFailed,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl UserError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UserError::UserNotFound => StatusCode::NOT_FOUND,
            UserError::EmailAlreadyExists => StatusCode::CONFLICT,
            UserError::InvalidCredentials | UserError::InvalidToken => StatusCode::UNAUTHORIZED,
            UserError::InvalidProfileData(_)
            | UserError::EmailVerificationFailed
            | UserError::InvalidInput(_)
            | UserError::BadRequest(_) => StatusCode::BAD_REQUEST,
            UserError::LogoutFailed | UserError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => UserError::UserNotFound,
            StoreError::DuplicateEmail => UserError::EmailAlreadyExists,
            StoreError::Backend(e) => UserError::Internal(e.context("user store")),
        }
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            UserError::Internal(e) => {
                error!(error = %format!("{e:#}"), "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn store_errors_map_to_domain_errors() {
        assert!(matches!(
            UserError::from(StoreError::NotFound),
            UserError::UserNotFound
        ));
        assert!(matches!(
            UserError::from(StoreError::DuplicateEmail),
            UserError::EmailAlreadyExists
        ));
        assert!(matches!(
            UserError::from(StoreError::Backend(anyhow::anyhow!("boom"))),
            UserError::Internal(_)
        ));
    }

    #[tokio::test]
    async fn internal_error_hides_detail() {
        let res = UserError::Internal(anyhow::anyhow!("connection refused at 10.0.0.3")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(res).await;
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn domain_errors_carry_status_and_message() {
        let res = UserError::EmailAlreadyExists.into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(res).await["error"], "email already exists");

        assert_eq!(
            UserError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(UserError::LogoutFailed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            UserError::InvalidProfileData("bio too long".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
