use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout: Duration,
}

/// Where user records live.
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    Postgres(DatabaseConfig),
    Memory,
}

/// Which auth backend the service talks to.
#[derive(Debug, Clone, Deserialize)]
pub enum AuthConfig {
    Remote { url: String, timeout: Duration },
    Local(JwtConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

/// Longest accepted local token lifetime, one year.
pub const MAX_JWT_TTL_MINUTES: i64 = 525_600;

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn checked_ttl_minutes(ttl: i64) -> anyhow::Result<i64> {
    if !(1..=MAX_JWT_TTL_MINUTES).contains(&ttl) {
        anyhow::bail!("JWT_TTL_MINUTES must be between 1 and {MAX_JWT_TTL_MINUTES}, got {ttl}");
    }
    Ok(ttl)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match var_or("USER_STORE", "postgres").as_str() {
            "postgres" => StoreConfig::Postgres(DatabaseConfig {
                url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
                timeout: Duration::from_secs(parsed_or("DATABASE_TIMEOUT_SEC", 5)),
            }),
            "memory" => StoreConfig::Memory,
            other => anyhow::bail!("unknown USER_STORE: {other}"),
        };

        let auth = match var_or("AUTH_MODE", "remote").as_str() {
            "remote" => AuthConfig::Remote {
                url: var_or("AUTH_SERVICE_URL", "http://localhost:8080"),
                timeout: Duration::from_secs(parsed_or("AUTH_SERVICE_TIMEOUT_SEC", 5)),
            },
            "local" => AuthConfig::Local(JwtConfig {
                secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: var_or("JWT_ISSUER", "quser"),
                audience: var_or("JWT_AUDIENCE", "quser-users"),
                ttl_minutes: checked_ttl_minutes(parsed_or("JWT_TTL_MINUTES", 60))?,
            }),
            other => anyhow::bail!("unknown AUTH_MODE: {other}"),
        };

        Ok(Self {
            host: var_or("APP_HOST", "0.0.0.0"),
            port: parsed_or("APP_PORT", 8081),
            store,
            auth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_falls_back_on_garbage() {
        std::env::set_var("QUSER_TEST_TIMEOUT", "soon");
        assert_eq!(parsed_or("QUSER_TEST_TIMEOUT", 5u64), 5);
        std::env::set_var("QUSER_TEST_TIMEOUT", "12");
        assert_eq!(parsed_or("QUSER_TEST_TIMEOUT", 5u64), 12);
        std::env::remove_var("QUSER_TEST_TIMEOUT");
    }

    #[test]
    fn jwt_ttl_must_be_positive_and_bounded() {
        assert_eq!(checked_ttl_minutes(60).unwrap(), 60);
        assert_eq!(
            checked_ttl_minutes(MAX_JWT_TTL_MINUTES).unwrap(),
            MAX_JWT_TTL_MINUTES
        );
        for bad in [0, -5, MAX_JWT_TTL_MINUTES + 1, i64::MAX] {
            let err = checked_ttl_minutes(bad).unwrap_err();
            assert!(err.to_string().contains("JWT_TTL_MINUTES"));
        }
    }

    #[test]
    fn var_or_treats_empty_as_unset() {
        std::env::set_var("QUSER_TEST_HOST", "");
        assert_eq!(var_or("QUSER_TEST_HOST", "0.0.0.0"), "0.0.0.0");
        std::env::remove_var("QUSER_TEST_HOST");
    }
}
