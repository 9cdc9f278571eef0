use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("missing authorization")]
    MissingAuth,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid password")]
    InvalidPassword,
    #[error("user not found")]
    UserNotFound,
    #[error("username already exists")]
    UsernameTaken,
    #[error("invite code required")]
    InviteRequired,
    #[error("invalid or used invite code")]
    InviteUnavailable,
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("failed to hash password")]
    PasswordHash,
    #[error("failed to generate token")]
    Token,
    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Database(ref err) = self {
            tracing::error!(error = %err, "store operation failed");
        }

        let status = match &self {
            ApiError::BadRequest(_)
            | ApiError::UsernameTaken
            | ApiError::InviteRequired
            | ApiError::InviteUnavailable => StatusCode::BAD_REQUEST,
            ApiError::MissingAuth | ApiError::InvalidToken | ApiError::InvalidPassword => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::Database(_)
            | ApiError::PasswordHash
            | ApiError::Token
            | ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
