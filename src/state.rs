use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    auth::{AuthService, LocalAuthService, RemoteAuthClient},
    config::{AppConfig, AuthConfig, JwtConfig, StoreConfig},
    users::{InMemoryUserStore, PgUserStore, UserService, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub auth: Arc<dyn AuthService>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match &config.store {
            StoreConfig::Postgres(db) => {
                let store = PgUserStore::connect(&db.url, db.max_connections, db.timeout).await?;
                sqlx::migrate!("./migrations")
                    .run(store.pool())
                    .await
                    .context("run migrations")?;
                info!("using postgres user store");
                Arc::new(store)
            }
            StoreConfig::Memory => {
                warn!("using in-memory user store; data is lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };

        let auth: Arc<dyn AuthService> = match &config.auth {
            AuthConfig::Remote { url, timeout } => {
                info!(%url, timeout_secs = timeout.as_secs(), "using remote auth service");
                Arc::new(RemoteAuthClient::new(url, *timeout)?)
            }
            AuthConfig::Local(jwt) => {
                warn!("using local auth backend");
                Arc::new(LocalAuthService::from_config(jwt))
            }
        };

        Ok(Self::from_parts(store, auth))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            users: Arc::new(UserService::new(store, auth.clone())),
            auth,
        }
    }

    /// In-memory store plus local auth backend, for tests and demos.
    pub fn fake() -> Self {
        let auth = LocalAuthService::from_config(&JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
        });
        Self::from_parts(Arc::new(InMemoryUserStore::new()), Arc::new(auth))
    }
}
