use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    model::{NewUser, User, UserProfile, UserStatus},
    repo::{StoreError, UserStore},
};

/// Process-local store used by tests and `USER_STORE=memory` runs.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    async fn mutate<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            status: UserStatus::Pending,
            is_verified: false,
            profile: new.profile,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.email == email))
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        stored.email = user.email.clone();
        stored.name = user.name.clone();
        stored.status = user.status;
        stored.is_verified = user.is_verified;
        stored.profile = user.profile.clone();
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        profile: &UserProfile,
    ) -> Result<(), StoreError> {
        let name = name.to_string();
        let profile = profile.clone();
        self.mutate(id, move |u| {
            u.name = name;
            u.profile = Some(profile);
        })
        .await
    }

    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        self.mutate(id, move |u| {
            u.profile.get_or_insert_with(UserProfile::default).last_login = Some(at);
        })
        .await
    }

    async fn update_verification(&self, id: Uuid, is_verified: bool) -> Result<(), StoreError> {
        self.mutate(id, move |u| {
            u.is_verified = is_verified;
            if is_verified {
                u.status = UserStatus::Active;
            }
        })
        .await
    }

    async fn update_status(&self, id: Uuid, status: UserStatus) -> Result<(), StoreError> {
        self.mutate(id, move |u| u.status = status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
            name: "Ann".into(),
            profile: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_pending_status() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        assert_eq!(user.status, UserStatus::Pending);
        assert!(!user.is_verified);
        assert_eq!(user.created_at, user.updated_at);

        let found = store.find_by_id(user.id).await.unwrap().expect("user exists");
        assert_eq!(found, user);
        assert!(store.exists_by_email("a@x.com").await.unwrap());
        assert!(!store.exists_by_email("b@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        store.create(new_user("a@x.com")).await.unwrap();
        let err = store.create(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn verification_activates_account() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        store.update_verification(user.id, true).await.unwrap();

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(user.is_verified);
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.updated_at >= user.created_at);
    }

    #[tokio::test]
    async fn touch_last_login_sets_only_that_field() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        let profile = UserProfile {
            bio: Some("hello".into()),
            ..Default::default()
        };
        store.update_profile(user.id, "Annie", &profile).await.unwrap();

        let at = time::macros::datetime!(2024-03-01 12:00:00 UTC);
        store.touch_last_login(user.id, at).await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Annie");
        let profile = stored.profile.unwrap();
        assert_eq!(profile.bio.as_deref(), Some("hello"));
        assert_eq!(profile.last_login, Some(at));

        assert!(matches!(
            store.touch_last_login(Uuid::new_v4(), at).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_status_and_missing_ids() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        store
            .update_status(user.id, UserStatus::Inactive)
            .await
            .unwrap();
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.status, UserStatus::Inactive);

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.update_status(missing, UserStatus::Active).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store
                .update_profile(missing, "Bob", &UserProfile::default())
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn full_update_keeps_email_unique() {
        let store = InMemoryUserStore::new();
        let a = store.create(new_user("a@x.com")).await.unwrap();
        store.create(new_user("b@x.com")).await.unwrap();

        let mut changed = a.clone();
        changed.email = "b@x.com".into();
        assert!(matches!(
            store.update(&changed).await,
            Err(StoreError::DuplicateEmail)
        ));

        changed.email = "c@x.com".into();
        changed.name = "Annie".into();
        store.update(&changed).await.unwrap();
        let stored = store.find_by_email("c@x.com").await.unwrap().unwrap();
        assert_eq!(stored.name, "Annie");
        assert_eq!(stored.password_hash, a.password_hash);
    }
}
