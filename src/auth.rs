use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::ApiError;

// JWT secret loaded from environment variable
static JWT_SECRET: LazyLock<Vec<u8>> = LazyLock::new(|| match std::env::var("JWT_SECRET") {
    Ok(secret) => {
        tracing::info!("JWT_SECRET loaded from environment");
        secret.into_bytes()
    }
    Err(_) => {
        tracing::warn!(
            "JWT_SECRET not set! Using insecure default. Set JWT_SECRET env var in production!"
        );
        b"dev-only-insecure-default-key-change-me".to_vec()
    }
});

pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

/// Hash password using Argon2
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::PasswordHash)
}

/// Verify password against hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| ApiError::PasswordHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a bearer token for an authenticated user
pub fn issue_token(user_id: i64, username: &str) -> Result<String, ApiError> {
    let now = Utc::now();
    let exp = now + Duration::days(TOKEN_TTL_DAYS);

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&JWT_SECRET),
    )
    .map_err(|_| ApiError::Token)
}

/// Validate a bearer token and return its claims
pub fn verify_token(token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&JWT_SECRET),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::InvalidToken)
}

/// Authenticated user extractor for Axum
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());

        // Browsers cannot set headers on the WebSocket open, so the handshake
        // passes the token as a query parameter instead.
        let token = match bearer {
            Some(token) => token,
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(query)| query.token)
                .ok_or(ApiError::MissingAuth)?,
        };

        let claims = verify_token(&token)?;
        let user_id = claims.sub.parse::<i64>().map_err(|_| ApiError::InvalidToken)?;

        Ok(AuthUser {
            id: user_id,
            username: claims.username,
        })
    }
}
