use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{NewUser, User, UserProfile, UserStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A mutation targeted an id that does not exist.
    #[error("user not found")]
    NotFound,
    /// The storage layer's uniqueness constraint on email rejected the write.
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence capability for user records.
///
/// Email uniqueness is enforced here, not by callers: `create` must return
/// `StoreError::DuplicateEmail` when another record already holds the email.
/// Every mutating call refreshes `updated_at`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;
    /// Overwrites the mutable fields (email, name, status, verification, profile).
    async fn update(&self, user: &User) -> Result<(), StoreError>;
    /// Writes name and profile together.
    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        profile: &UserProfile,
    ) -> Result<(), StoreError>;
    /// Sets `profile.last_login` only; name and the other profile fields are left as stored.
    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError>;
    /// Sets the verification flag; verifying also activates the account.
    async fn update_verification(&self, id: Uuid, is_verified: bool) -> Result<(), StoreError>;
    async fn update_status(&self, id: Uuid, status: UserStatus) -> Result<(), StoreError>;
}
