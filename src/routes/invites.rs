use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invites", post(create_invite))
        .route("/invite/validate", post(validate_invite))
}

#[derive(Debug, Deserialize)]
pub struct ValidateInviteRequest {
    pub code: String,
}

async fn create_invite(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let code = store::invites::generate_invite(&state.db).await?;
    tracing::info!(user_id = user.id, "invite created");
    Ok(Json(serde_json::json!({ "code": code })))
}

/// Pre-registration check; unauthenticated so the invite page can call it.
async fn validate_invite(
    State(state): State<AppState>,
    Json(req): Json<ValidateInviteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if store::invites::validate_invite(&state.db, req.code.trim()).await? {
        Ok(Json(serde_json::json!({ "valid": true })))
    } else {
        Err(ApiError::InviteUnavailable)
    }
}
