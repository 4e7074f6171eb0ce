use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        LoginRequest, LoginResponse, LookupQuery, MessageResponse, RegisterRequest,
        StatusResponse, UpdateProfileRequest, UserResponse, VerifyEmailQuery,
    },
    error::UserError,
    extractors::AuthUser,
};
use crate::state::AppState;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/:id/verify-email", get(verify_email))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users/logout", post(logout))
        .route("/api/users/lookup", get(lookup_by_email))
        .route("/api/users/:id/profile", get(get_profile).put(update_profile))
        .route("/api/users/:id/status", get(get_status))
}

/// Path ids that are not UUIDs cannot name a user.
fn parse_user_id(raw: &str) -> Result<Uuid, UserError> {
    Uuid::parse_str(raw).map_err(|_| UserError::UserNotFound)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, UserError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| UserError::BadRequest(rejection.body_text()))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), UserError> {
    let req = json_body(payload)?;
    let user = state.users.register(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, UserError> {
    let req = json_body(payload)?;
    Ok(Json(state.users.login(req).await?))
}

#[instrument(skip(state, auth), fields(user_id = %auth.user_id))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, UserError> {
    state.users.logout(&auth.token).await?;
    Ok(Json(MessageResponse {
        message: "logged out",
    }))
}

#[instrument(skip(state, _auth))]
pub async fn get_profile(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, UserError> {
    let user_id = parse_user_id(&id)?;
    Ok(Json(state.users.get_profile(user_id).await?))
}

#[instrument(skip(state, _auth, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, UserError> {
    let user_id = parse_user_id(&id)?;
    let req = json_body(payload)?;
    Ok(Json(state.users.update_profile(user_id, req).await?))
}

#[instrument(skip(state, query))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<MessageResponse>, UserError> {
    let user_id = parse_user_id(&id)?;
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| UserError::BadRequest("verification token is required".into()))?;
    state.users.verify_email(user_id, &token).await?;
    Ok(Json(MessageResponse {
        message: "email verified",
    }))
}

#[instrument(skip(state, _auth))]
pub async fn get_status(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, UserError> {
    let user_id = parse_user_id(&id)?;
    let status = state.users.get_user_status(user_id).await?;
    Ok(Json(StatusResponse { status }))
}

#[instrument(skip(state, _auth, query))]
pub async fn lookup_by_email(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<LookupQuery>,
) -> Result<Json<UserResponse>, UserError> {
    let email = query
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| UserError::BadRequest("email query parameter is required".into()))?;
    Ok(Json(state.users.find_by_email(&email).await?))
}
