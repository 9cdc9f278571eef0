use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::codec;
use crate::error::ApiError;
use crate::models::User;
use crate::state::AppState;
use crate::store;
use crate::validation::{validate_password, validate_username};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub invite_code: String,
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let username = req.username.trim();
    validate_username(username).map_err(|_| ApiError::BadRequest("invalid username".into()))?;
    validate_password(&req.password)
        .map_err(|_| ApiError::BadRequest("password must be at least 6 characters".into()))?;

    if req.public_key.is_empty() {
        return Err(ApiError::BadRequest("public key required".into()));
    }
    let public_key = codec::decode(&req.public_key)
        .map_err(|_| ApiError::BadRequest("invalid public key".into()))?;

    if store::users::get_user_by_username(&state.db, username)
        .await?
        .is_some()
    {
        return Err(ApiError::UsernameTaken);
    }

    // Bootstrap rule: the first user registers without an invite.
    let invite_required = store::users::count_users(&state.db).await? > 0;
    let invite_code = Some(req.invite_code.trim()).filter(|code| !code.is_empty());
    if invite_required {
        let code = invite_code.ok_or(ApiError::InviteRequired)?;
        if !store::invites::validate_invite(&state.db, code).await? {
            return Err(ApiError::InviteUnavailable);
        }
    }

    let password_hash = auth::hash_password(&req.password)?;
    let user = store::users::create_user_with_invite(
        &state.db,
        username,
        &password_hash,
        &public_key,
        invite_code,
        invite_required,
    )
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "registered new user");

    let token = auth::issue_token(user.id, &user.username)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.username.is_empty() {
        return Err(ApiError::BadRequest("username required".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::BadRequest("password required".into()));
    }

    let user = store::users::get_user_by_username_with_password(&state.db, req.username.trim())
        .await?
        .ok_or(ApiError::UserNotFound)?;

    if !auth::verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::InvalidPassword);
    }

    let token = auth::issue_token(user.id, &user.username)?;
    Ok(Json(AuthResponse { token, user }))
}
