use std::{str::FromStr, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgQueryResult},
    types::Json,
    PgPool,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::instrument;
use uuid::Uuid;

use super::{
    model::{NewUser, User, UserProfile, UserStatus},
    repo::{StoreError, UserStore},
    repo_types::UserRow,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, name, status, is_verified, profile, created_at, updated_at";

/// Postgres-backed user store. Email uniqueness comes from the `users_email_key` index.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Builds a pool where both connection checkout and every statement are bounded by `timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let options = PgConnectOptions::from_str(database_url)
            .context("parse DATABASE_URL")?
            .options([("statement_timeout", timeout.as_millis().to_string())]);
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

fn db_err(e: sqlx::Error, what: &'static str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        _ => StoreError::Backend(anyhow::Error::new(e).context(what)),
    }
}

fn affected(res: PgQueryResult) -> Result<(), StoreError> {
    if res.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, new), fields(email = %new.email))]
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, profile)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.profile.map(Json))
        .fetch_one(&self.db)
        .await
        .map_err(|e| db_err(e, "insert user"))?;
        Ok(User::try_from(row)?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| db_err(e, "find user by email"))?;
        Ok(row.map(User::try_from).transpose()?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| db_err(e, "find user by id"))?;
        Ok(row.map(User::try_from).transpose()?)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.db)
                .await
                .map_err(|e| db_err(e, "check email exists"))?;
        Ok(exists)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET email = $2, name = $3, status = $4, is_verified = $5,
                   profile = $6, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.status.as_str())
        .bind(user.is_verified)
        .bind(user.profile.as_ref().map(Json))
        .execute(&self.db)
        .await
        .map_err(|e| db_err(e, "update user"))?;
        affected(res)
    }

    #[instrument(skip(self, name, profile))]
    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        profile: &UserProfile,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET name = $2, profile = $3, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(Json(profile))
        .execute(&self.db)
        .await
        .map_err(|e| db_err(e, "update profile"))?;
        affected(res)
    }

    #[instrument(skip(self))]
    async fn touch_last_login(&self, id: Uuid, at: OffsetDateTime) -> Result<(), StoreError> {
        let at = at.format(&Rfc3339).context("format last_login")?;
        let res = sqlx::query(
            r#"
            UPDATE users
               SET profile = jsonb_set(coalesce(profile, '{}'::jsonb), '{last_login}', to_jsonb($2::text)),
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.db)
        .await
        .map_err(|e| db_err(e, "touch last login"))?;
        affected(res)
    }

    #[instrument(skip(self))]
    async fn update_verification(&self, id: Uuid, is_verified: bool) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET is_verified = $2,
                   status = CASE WHEN $2 THEN 'active' ELSE status END,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(is_verified)
        .execute(&self.db)
        .await
        .map_err(|e| db_err(e, "update verification"))?;
        affected(res)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: Uuid, status: UserStatus) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.db)
            .await
            .map_err(|e| db_err(e, "update status"))?;
        affected(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_constraint_errors_are_backend_failures() {
        let err = db_err(sqlx::Error::RowNotFound, "find user by id");
        match err {
            StoreError::Backend(e) => assert!(format!("{e:#}").contains("find user by id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let err = PgUserStore::connect("not a url", 1, Duration::from_secs(1))
            .await
            .err()
            .expect("malformed url");
        assert!(format!("{err:#}").contains("DATABASE_URL"));
    }
}
