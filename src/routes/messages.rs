use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::codec;
use crate::error::ApiError;
use crate::hub::Envelope;
use crate::models::Message;
use crate::state::AppState;
use crate::store;
use crate::store::messages::DEFAULT_PAGE_SIZE;
use crate::validation::validate_message_kind;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/clear", post(clear_messages))
        .route("/:other_id", get(get_messages))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: i64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub content: String,
    pub nonce: String,
}

#[derive(Debug, Deserialize)]
pub struct ClearMessagesRequest {
    pub other_user_id: i64,
}

/// Persist a message, then forward it in real time if the receiver has a
/// live socket. Persistence is the source of truth; a dropped frame is not
/// an error.
async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    if req.receiver_id == 0 || req.content.is_empty() || req.nonce.is_empty() {
        return Err(ApiError::BadRequest("missing required fields".into()));
    }

    let content = codec::decode(&req.content)
        .map_err(|_| ApiError::BadRequest("invalid content encoding".into()))?;
    let nonce = codec::decode(&req.nonce)
        .map_err(|_| ApiError::BadRequest("invalid nonce encoding".into()))?;

    let kind = match req.kind.as_deref() {
        None | Some("") => "text",
        Some(kind) => {
            validate_message_kind(kind)
                .map_err(|_| ApiError::BadRequest("invalid message type".into()))?;
            kind
        }
    };

    let message = store::messages::save_message(
        &state.db,
        user.id,
        req.receiver_id,
        kind,
        &content,
        &nonce,
    )
    .await?;

    if state.hub.is_online(req.receiver_id) {
        state.hub.send_message(
            req.receiver_id,
            Envelope {
                id: Some(message.id),
                kind: "message".to_string(),
                from: user.id,
                content: Some(message.content.clone()),
                nonce: Some(message.nonce.clone()),
                timestamp: message.timestamp.timestamp(),
                ..Default::default()
            },
        );
    }

    Ok(Json(message))
}

/// Conversation page with `other_id`, newest first. Opening the conversation
/// marks the incoming messages read and tells the sender so.
async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(other_id): Path<i64>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let other = store::users::get_user_by_id(&state.db, other_id)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    let messages =
        store::messages::get_messages_between(&state.db, user.id, other.id, DEFAULT_PAGE_SIZE, 0)
            .await?;

    match store::messages::mark_messages_read(&state.db, other.id, user.id).await {
        Ok(()) => {
            if state.hub.is_online(other.id) {
                let data = serde_json::to_vec(&serde_json::json!({ "from": user.id }))
                    .unwrap_or_default();
                state.hub.send_message(
                    other.id,
                    Envelope {
                        kind: "read_receipt".to_string(),
                        from: user.id,
                        data: Some(data),
                        timestamp: Utc::now().timestamp(),
                        ..Default::default()
                    },
                );
            }
        }
        Err(err) => tracing::warn!(user_id = user.id, error = %err, "failed to mark messages read"),
    }

    Ok(Json(messages))
}

async fn clear_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ClearMessagesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    store::messages::delete_messages_between(&state.db, user.id, req.other_user_id).await?;

    state.hub.send_message(
        req.other_user_id,
        Envelope {
            kind: "clear_messages".to_string(),
            from: user.id,
            timestamp: Utc::now().timestamp(),
            ..Default::default()
        },
    );

    tracing::info!(
        user_id = user.id,
        other_user_id = req.other_user_id,
        "cleared conversation"
    );
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
