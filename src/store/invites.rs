use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::ApiError;

/// Create a fresh single-use invite and return its 32-hex-char code.
pub async fn generate_invite(pool: &SqlitePool) -> Result<String, ApiError> {
    let code = Uuid::new_v4().simple().to_string();
    sqlx::query("INSERT INTO invites (code, created_at) VALUES (?, ?)")
        .bind(&code)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(code)
}

/// An invite is consumable iff it exists and `used_by` is still NULL.
pub async fn validate_invite(pool: &SqlitePool, code: &str) -> Result<bool, ApiError> {
    let available = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM invites WHERE code = ? AND used_by IS NULL",
    )
    .bind(code)
    .fetch_one(pool)
    .await?;
    Ok(available > 0)
}

/// Atomically consume an invite. The conditional update succeeds for exactly
/// one caller; everyone else sees `false`.
pub async fn consume_invite(
    pool: &SqlitePool,
    code: &str,
    user_id: i64,
) -> Result<bool, ApiError> {
    let consumed = sqlx::query(
        "UPDATE invites SET used_by = ?, used_at = ? WHERE code = ? AND used_by IS NULL",
    )
    .bind(user_id)
    .bind(Utc::now())
    .bind(code)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(consumed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Invite;
    use crate::store::{self, users};
    use futures::future::join_all;

    #[tokio::test]
    async fn generated_codes_are_32_hex_chars() {
        let pool = store::test_pool().await;
        let code = generate_invite(&pool).await.unwrap();
        assert_eq!(code.len(), 32);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));

        let other = generate_invite(&pool).await.unwrap();
        assert_ne!(code, other);
    }

    #[tokio::test]
    async fn consumption_is_monotone_and_single_use() {
        let pool = store::test_pool().await;
        let user = users::create_user(&pool, "alice", "h", b"A").await.unwrap();
        let code = generate_invite(&pool).await.unwrap();

        assert!(validate_invite(&pool, &code).await.unwrap());
        assert!(consume_invite(&pool, &code, user.id).await.unwrap());
        assert!(!validate_invite(&pool, &code).await.unwrap());
        assert!(!consume_invite(&pool, &code, user.id).await.unwrap());

        let invite = sqlx::query_as::<_, Invite>("SELECT * FROM invites WHERE code = ?")
            .bind(&code)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(invite.used_by, Some(user.id));
        assert!(invite.used_at.is_some());
    }

    #[tokio::test]
    async fn unknown_codes_are_unavailable() {
        let pool = store::test_pool().await;
        assert!(!validate_invite(&pool, "deadbeef").await.unwrap());
        assert!(!consume_invite(&pool, "deadbeef", 1).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_consumption_admits_exactly_one() {
        let pool = store::test_pool().await;
        let user = users::create_user(&pool, "alice", "h", b"A").await.unwrap();
        let code = generate_invite(&pool).await.unwrap();

        let attempts = (0..8).map(|_| {
            let pool = pool.clone();
            let code = code.clone();
            let user_id = user.id;
            tokio::spawn(async move { consume_invite(&pool, &code, user_id).await.unwrap() })
        });

        let outcomes = join_all(attempts).await;
        let successes = outcomes
            .into_iter()
            .filter(|outcome| *outcome.as_ref().unwrap())
            .count();
        assert_eq!(successes, 1);
    }
}
