use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::User;

const PUBLIC_COLUMNS: &str = "id, username, public_key, created_at, last_seen";

pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
    public_key: &[u8],
) -> Result<User, ApiError> {
    create_user_with_invite(pool, username, password_hash, public_key, None, false).await
}

/// Insert a user and consume the invite in one transaction.
///
/// When the invite is required, a conditional update that matches zero rows
/// (unknown or already-used code) rolls the whole registration back, so a
/// burst of registrations racing for one code produces exactly one user.
/// During bootstrap (no users yet) a provided code is consumed best-effort.
pub async fn create_user_with_invite(
    pool: &SqlitePool,
    username: &str,
    password_hash: &str,
    public_key: &[u8],
    invite_code: Option<&str>,
    invite_required: bool,
) -> Result<User, ApiError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let user_id = sqlx::query(
        "INSERT INTO users (username, password_hash, public_key, created_at, last_seen) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(password_hash)
    .bind(public_key)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return ApiError::UsernameTaken;
            }
        }
        ApiError::Database(e)
    })?
    .last_insert_rowid();

    if let Some(code) = invite_code {
        let consumed = sqlx::query(
            "UPDATE invites SET used_by = ?, used_at = ? WHERE code = ? AND used_by IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .bind(code)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if consumed == 0 && invite_required {
            tx.rollback().await?;
            return Err(ApiError::InviteUnavailable);
        }
    }

    tx.commit().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {PUBLIC_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {PUBLIC_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn get_user_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {PUBLIC_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Login-specific variant; the only query that surfaces the password hash.
pub async fn get_user_by_username_with_password(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, public_key, created_at, last_seen \
         FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn get_all_users(pool: &SqlitePool) -> Result<Vec<User>, ApiError> {
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {PUBLIC_COLUMNS} FROM users ORDER BY username"
    ))
    .fetch_all(pool)
    .await?;
    Ok(users)
}

pub async fn update_public_key(
    pool: &SqlitePool,
    user_id: i64,
    public_key: &[u8],
) -> Result<(), ApiError> {
    sqlx::query("UPDATE users SET public_key = ? WHERE id = ?")
        .bind(public_key)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_last_seen(pool: &SqlitePool, user_id: i64) -> Result<(), ApiError> {
    sqlx::query("UPDATE users SET last_seen = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_users(pool: &SqlitePool) -> Result<i64, ApiError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
