use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest, UserResponse},
    error::UserError,
    model::{NewUser, UserProfile, UserStatus},
    repo::{StoreError, UserStore},
};
use crate::auth::{AuthError, AuthService};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;
const MAX_BIO_LEN: usize = 500;
const MAX_AVATAR_LEN: usize = 2048;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9 ()-]{6,20}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trimmed value, or `None` when absent or blank.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn internal(e: AuthError, what: &'static str) -> UserError {
    UserError::Internal(anyhow::Error::new(e).context(what))
}

/// Use cases for user accounts, coordinating the user store and the auth service.
///
/// Holds no mutable state of its own; all state lives behind the two
/// capabilities it is constructed with.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    auth: Arc<dyn AuthService>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, auth: Arc<dyn AuthService>) -> Self {
        Self { store, auth }
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<UserResponse, UserError> {
        let email = normalize_email(&req.email);
        let name = req.name.trim().to_string();

        if !is_valid_email(&email) {
            warn!("invalid email");
            return Err(UserError::InvalidInput("invalid email".into()));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(UserError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if name.is_empty() {
            return Err(UserError::InvalidInput("name is required".into()));
        }

        // Fast path only; the store's unique constraint is authoritative.
        if self.store.exists_by_email(&email).await? {
            warn!("email already registered");
            return Err(UserError::EmailAlreadyExists);
        }

        let password_hash = self
            .auth
            .hash_password(&req.password)
            .await
            .map_err(|e| internal(e, "hash password"))?;

        let user = self
            .store
            .create(NewUser {
                email,
                password_hash,
                name,
                profile: Some(UserProfile {
                    last_login: Some(OffsetDateTime::now_utc()),
                    ..Default::default()
                }),
            })
            .await
            .map_err(|e| {
                if matches!(e, StoreError::DuplicateEmail) {
                    warn!("concurrent registration won the email");
                }
                UserError::from(e)
            })?;

        info!(user_id = %user.id, "user registered");
        Ok(user.into())
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, UserError> {
        let email = normalize_email(&req.email);

        let Some(mut user) = self.store.find_by_email(&email).await? else {
            warn!("login unknown email");
            return Err(UserError::InvalidCredentials);
        };

        let ok = self
            .auth
            .verify_password(&req.password, &user.password_hash)
            .await
            .map_err(|e| internal(e, "verify password"))?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(UserError::InvalidCredentials);
        }

        let token = self
            .auth
            .issue_token(user.id)
            .await
            .map_err(|e| internal(e, "issue token"))?;

        // Only after a token exists; writes last_login and nothing else.
        let now = OffsetDateTime::now_utc();
        if let Err(e) = self.store.touch_last_login(user.id, now).await {
            if let Err(revoke) = self.auth.revoke_token(&token.access_token).await {
                warn!(user_id = %user.id, error = %revoke, "revoke after failed login");
            }
            return Err(e.into());
        }
        user.profile.get_or_insert_with(UserProfile::default).last_login = Some(now);

        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
            user: user.into(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserResponse, UserError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::UserNotFound)?;
        Ok(user.into())
    }

    /// Applies a partial update. Absent or blank fields keep their current
    /// value, so a field cannot be cleared through this call.
    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<UserResponse, UserError> {
        let name = non_empty(req.name);
        let phone_number = non_empty(req.phone_number);
        let bio = non_empty(req.bio);
        let avatar = non_empty(req.avatar);

        validate_profile(
            name.as_deref(),
            phone_number.as_deref(),
            bio.as_deref(),
            avatar.as_deref(),
        )?;

        let mut user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::UserNotFound)?;

        if name.is_none() && phone_number.is_none() && bio.is_none() && avatar.is_none() {
            return Ok(user.into());
        }

        let mut profile = user.profile.take().unwrap_or_default();
        if let Some(name) = name {
            user.name = name;
        }
        if phone_number.is_some() {
            profile.phone_number = phone_number;
        }
        if bio.is_some() {
            profile.bio = bio;
        }
        if avatar.is_some() {
            profile.avatar = avatar;
        }

        self.store
            .update_profile(user_id, &user.name, &profile)
            .await?;
        user.profile = Some(profile);

        info!(%user_id, "profile updated");
        Ok(user.into())
    }

    /// Marks the email verified and activates the account. Verifying an
    /// already verified user succeeds again.
    #[instrument(skip(self, token))]
    pub async fn verify_email(&self, user_id: Uuid, token: &str) -> Result<(), UserError> {
        let subject = self.auth.validate_token(token).await.map_err(|e| match e {
            AuthError::Transport(_) => internal(e, "validate verification token"),
            other => {
                warn!(error = %other, "verification token rejected");
                UserError::EmailVerificationFailed
            }
        })?;
        if subject != user_id {
            warn!(%subject, "verification token belongs to another user");
            return Err(UserError::EmailVerificationFailed);
        }

        self.store.update_verification(user_id, true).await?;
        info!(%user_id, "email verified");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), UserError> {
        self.auth.revoke_token(token).await.map_err(|e| match e {
            AuthError::Unauthorized => UserError::InvalidToken,
            AuthError::Rejected { status } => {
                warn!(status, "auth service refused revocation");
                UserError::LogoutFailed
            }
            AuthError::Transport(_) => internal(e, "revoke token"),
        })?;
        info!("user logged out");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_user_status(&self, user_id: Uuid) -> Result<UserStatus, UserError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::UserNotFound)?;
        Ok(user.status)
    }

    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<UserResponse, UserError> {
        let user = self
            .store
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(UserError::UserNotFound)?;
        Ok(user.into())
    }
}

fn validate_profile(
    name: Option<&str>,
    phone_number: Option<&str>,
    bio: Option<&str>,
    avatar: Option<&str>,
) -> Result<(), UserError> {
    let invalid = |msg: &str| Err(UserError::InvalidProfileData(msg.to_string()));

    if name.is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
        return invalid("name is too long");
    }
    if phone_number.is_some_and(|p| !PHONE_RE.is_match(p)) {
        return invalid("invalid phone number");
    }
    if bio.is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return invalid("bio is too long");
    }
    if avatar.is_some_and(|a| a.len() > MAX_AVATAR_LEN) {
        return invalid("avatar is too long");
    }
    Ok(())
}
