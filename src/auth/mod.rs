//! Authentication capability consumed by the user service.
//!
//! Token issuance, validation, revocation and password hashing are owned by
//! an external auth service. [`RemoteAuthClient`] talks to it over HTTP;
//! [`LocalAuthService`] is an in-process stand-in for tests and local runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod client;
pub mod jwt;
pub mod local;

pub use client::RemoteAuthClient;
pub use local::LocalAuthService;

/// Access token handed back to a client after login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Token or credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,
    /// Any other non-success answer from the auth service.
    #[error("auth service responded with status {status}")]
    Rejected { status: u16 },
    /// Network, timeout or decode failure.
    #[error("auth service request failed")]
    Transport(#[source] anyhow::Error),
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn issue_token(&self, user_id: Uuid) -> Result<IssuedToken, AuthError>;
    /// Returns the token's subject when the token is valid.
    async fn validate_token(&self, token: &str) -> Result<Uuid, AuthError>;
    async fn revoke_token(&self, token: &str) -> Result<(), AuthError>;
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}
