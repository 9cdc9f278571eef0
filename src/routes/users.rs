use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::codec;
use crate::error::ApiError;
use crate::models::User;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(me))
        .route("/update-key", post(update_key))
}

#[derive(Debug, Serialize)]
pub struct UserWithStatus {
    pub id: i64,
    pub username: String,
    #[serde(with = "codec::b64")]
    pub public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub online: bool,
}

impl UserWithStatus {
    fn from_user(user: User, online: bool) -> Self {
        Self {
            id: user.id,
            username: user.username,
            public_key: user.public_key,
            created_at: user.created_at,
            last_seen: user.last_seen,
            online,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
    pub public_key: String,
}

async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<UserWithStatus>>, ApiError> {
    let users = store::users::get_all_users(&state.db).await?;
    let response = users
        .into_iter()
        .map(|user| {
            let online = state.hub.is_online(user.id);
            UserWithStatus::from_user(user, online)
        })
        .collect();
    Ok(Json(response))
}

async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserWithStatus>, ApiError> {
    let record = store::users::get_user_by_id(&state.db, user.id)
        .await?
        .ok_or(ApiError::UserNotFound)?;
    Ok(Json(UserWithStatus::from_user(record, true)))
}

async fn update_key(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateKeyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.public_key.is_empty() {
        return Err(ApiError::BadRequest("public key required".into()));
    }
    let public_key = codec::decode(&req.public_key)
        .map_err(|_| ApiError::BadRequest("invalid public key".into()))?;

    store::users::update_public_key(&state.db, user.id, &public_key).await?;
    tracing::debug!(user_id = user.id, "public key updated");

    Ok(Json(serde_json::json!({ "success": true })))
}
