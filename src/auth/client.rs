use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{AuthError, AuthService, IssuedToken};

/// HTTP client for the external auth service.
///
/// Every request is bounded by the client-wide timeout; no call is retried.
#[derive(Clone)]
pub struct RemoteAuthClient {
    client: reqwest::Client,
    base_url: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".into()
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HashRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct HashResponse {
    hash: String,
}

#[derive(Debug, Serialize)]
struct VerifyPasswordRequest<'a> {
    password: &'a str,
    hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyPasswordResponse {
    valid: bool,
}

impl RemoteAuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build auth service http client")?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder, what: &'static str) -> Result<Response, AuthError> {
        let response = req
            .send()
            .await
            .with_context(|| format!("send {what} request"))
            .map_err(AuthError::Transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read body".to_string());
        warn!(%status, body = %body, "auth service rejected {what}");
        Err(AuthError::Rejected {
            status: status.as_u16(),
        })
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        what: &'static str,
    ) -> Result<T, AuthError> {
        response
            .json::<T>()
            .await
            .with_context(|| format!("parse {what} response"))
            .map_err(AuthError::Transport)
    }
}

#[async_trait]
impl AuthService for RemoteAuthClient {
    #[instrument(skip(self))]
    async fn issue_token(&self, user_id: Uuid) -> Result<IssuedToken, AuthError> {
        let req = self
            .client
            .post(self.url("/api/auth/token"))
            .header("X-User-ID", user_id.to_string());
        let response = self.send(req, "issue token").await?;
        let token: TokenResponse = Self::decode(response, "issue token").await?;
        Ok(IssuedToken {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
        })
    }

    #[instrument(skip_all)]
    async fn validate_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let req = self
            .client
            .get(self.url("/api/auth/token/validate"))
            .bearer_auth(token);
        let response = self.send(req, "validate token").await?;
        let body: ValidateResponse = Self::decode(response, "validate token").await?;
        if !body.valid {
            return Err(AuthError::Unauthorized);
        }
        let user_id = body
            .user_id
            .context("validate response without user_id")
            .and_then(|id| Uuid::parse_str(&id).context("validate response user_id"))
            .map_err(AuthError::Transport)?;
        Ok(user_id)
    }

    #[instrument(skip_all)]
    async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let req = self
            .client
            .post(self.url("/api/auth/token/revoke"))
            .bearer_auth(token);
        self.send(req, "revoke token").await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let req = self
            .client
            .post(self.url("/api/auth/hash"))
            .json(&HashRequest { password });
        let response = self.send(req, "hash password").await?;
        let body: HashResponse = Self::decode(response, "hash password").await?;
        Ok(body.hash)
    }

    #[instrument(skip_all)]
    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let req = self
            .client
            .post(self.url("/api/auth/password/verify"))
            .json(&VerifyPasswordRequest { password, hash });
        match self.send(req, "verify password").await {
            Ok(response) => {
                let body: VerifyPasswordResponse =
                    Self::decode(response, "verify password").await?;
                Ok(body.valid)
            }
            Err(AuthError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    const GOOD: &str = "good-token";
    const USER: &str = "5f0c6a54-2f57-4c36-9c2f-3f4a1f0b7e11";

    fn bearer(headers: &HeaderMap) -> Option<&str> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Stub auth service with the same contract as the real one.
    fn stub() -> Router {
        Router::new()
            .route(
                "/api/auth/token",
                post(|headers: HeaderMap| async move {
                    match headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
                        Some(id) => (
                            AxumStatus::OK,
                            Json(json!({
                                "access_token": format!("tok-{id}"),
                                "token_type": "Bearer",
                                "expires_in": 3600
                            })),
                        ),
                        None => (AxumStatus::BAD_REQUEST, Json(json!({"error": "no user"}))),
                    }
                }),
            )
            .route(
                "/api/auth/token/validate",
                get(|headers: HeaderMap| async move {
                    match bearer(&headers) {
                        Some(GOOD) => (AxumStatus::OK, Json(json!({"valid": true, "user_id": USER}))),
                        Some("stale") => (AxumStatus::OK, Json(json!({"valid": false}))),
                        _ => (AxumStatus::UNAUTHORIZED, Json(json!({"error": "bad token"}))),
                    }
                }),
            )
            .route(
                "/api/auth/token/revoke",
                post(|headers: HeaderMap| async move {
                    match bearer(&headers) {
                        Some(GOOD) => AxumStatus::OK,
                        Some("boom") => AxumStatus::INTERNAL_SERVER_ERROR,
                        _ => AxumStatus::UNAUTHORIZED,
                    }
                }),
            )
            .route(
                "/api/auth/hash",
                post(|Json(body): Json<Value>| async move {
                    let password = body["password"].as_str().unwrap_or_default();
                    Json(json!({ "hash": format!("hashed:{password}") }))
                }),
            )
            .route(
                "/api/auth/password/verify",
                post(|Json(body): Json<Value>| async move {
                    let expected = format!("hashed:{}", body["password"].as_str().unwrap_or_default());
                    Json(json!({ "valid": body["hash"] == expected.as_str() }))
                }),
            )
    }

    async fn spawn_stub() -> RemoteAuthClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, stub()).await.unwrap();
        });
        RemoteAuthClient::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn issue_token_sends_user_header() {
        let client = spawn_stub().await;
        let user_id = Uuid::new_v4();
        let token = client.issue_token(user_id).await.unwrap();
        assert_eq!(token.access_token, format!("tok-{user_id}"));
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn validate_maps_responses() {
        let client = spawn_stub().await;
        assert_eq!(
            client.validate_token(GOOD).await.unwrap(),
            Uuid::parse_str(USER).unwrap()
        );
        assert!(matches!(
            client.validate_token("stale").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            client.validate_token("forged").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn revoke_maps_status_codes() {
        let client = spawn_stub().await;
        client.revoke_token(GOOD).await.unwrap();
        assert!(matches!(
            client.revoke_token("forged").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            client.revoke_token("boom").await,
            Err(AuthError::Rejected { status: 500 })
        ));
    }

    #[tokio::test]
    async fn hash_and_verify_go_through_the_service() {
        let client = spawn_stub().await;
        let hash = client.hash_password("pw12345678").await.unwrap();
        assert_eq!(hash, "hashed:pw12345678");
        assert!(client.verify_password("pw12345678", &hash).await.unwrap());
        assert!(!client.verify_password("other", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            RemoteAuthClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.hash_password("pw").await,
            Err(AuthError::Transport(_))
        ));
    }
}
