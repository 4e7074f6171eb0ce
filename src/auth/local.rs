use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use rand::rngs::OsRng;
use time::OffsetDateTime;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{jwt::JwtKeys, AuthError, AuthService, IssuedToken};
use crate::config::JwtConfig;

/// In-process auth backend: argon2 password hashes and HS256 tokens with a
/// revocation list kept in memory.
pub struct LocalAuthService {
    keys: JwtKeys,
    /// Revoked token ids mapped to their expiry, pruned on every revoke.
    revoked: Mutex<HashMap<Uuid, usize>>,
}

impl LocalAuthService {
    pub fn new(keys: JwtKeys) -> Self {
        Self {
            keys,
            revoked: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self::new(JwtKeys::from_config(cfg))
    }

    fn is_revoked(&self, jti: &Uuid) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }
}

fn hash(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash_password: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("argon2 parse hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[async_trait]
impl AuthService for LocalAuthService {
    async fn issue_token(&self, user_id: Uuid) -> Result<IssuedToken, AuthError> {
        let access_token = self.keys.sign(user_id).map_err(AuthError::Transport)?;
        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".into(),
            expires_in: self.keys.ttl().as_secs() as i64,
        })
    }

    async fn validate_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.keys.verify(token).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::Unauthorized
        })?;
        if self.is_revoked(&claims.jti) {
            debug!(jti = %claims.jti, "token revoked");
            return Err(AuthError::Unauthorized);
        }
        Ok(claims.sub)
    }

    async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.keys.verify(token).map_err(|_| AuthError::Unauthorized)?;
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        if revoked.contains_key(&claims.jti) {
            return Err(AuthError::Unauthorized);
        }
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(claims.jti, claims.exp);
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let plain = password.to_owned();
        tokio::task::spawn_blocking(move || hash(&plain))
            .await
            .context("hash task")
            .and_then(|r| r)
            .map_err(|e| {
                error!(error = %e, "password hashing failed");
                AuthError::Transport(e)
            })
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let (plain, hash) = (password.to_owned(), hash.to_owned());
        match tokio::task::spawn_blocking(move || verify(&plain, &hash))
            .await
            .context("verify task")
            .map_err(AuthError::Transport)?
        {
            Ok(ok) => Ok(ok),
            Err(e) => {
                // An unparseable stored hash can never match.
                warn!(error = %e, "stored password hash is malformed");
                Ok(false)
            }
        }
    }
}
