use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::Message;

pub const DEFAULT_PAGE_SIZE: i64 = 50;

const COLUMNS: &str = "id, sender_id, receiver_id, type, content, nonce, timestamp, read";

/// Persist a message; the returned record carries the server-assigned id
/// and timestamp. The timestamp comes from the column default so it is
/// assigned at the moment the write actually happens, keeping it monotone
/// per (sender, receiver) pair.
pub async fn save_message(
    pool: &SqlitePool,
    sender_id: i64,
    receiver_id: i64,
    kind: &str,
    content: &[u8],
    nonce: &[u8],
) -> Result<Message, ApiError> {
    let id = sqlx::query(
        "INSERT INTO messages (sender_id, receiver_id, type, content, nonce) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .bind(kind)
    .bind(content)
    .bind(nonce)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_message_by_id(pool, id)
        .await?
        .ok_or(ApiError::Database(sqlx::Error::RowNotFound))
}

pub async fn get_message_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Message>, ApiError> {
    let message =
        sqlx::query_as::<_, Message>(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(message)
}

/// Conversation page between two users, newest first. Always a sequence,
/// never null.
pub async fn get_messages_between(
    pool: &SqlitePool,
    user_a: i64,
    user_b: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<Message>, ApiError> {
    let messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {COLUMNS} FROM messages \
         WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?) \
         ORDER BY timestamp DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(messages)
}

/// Mark every unread message from `sender_id` to `receiver_id` as read.
/// Zero matching rows is still success.
pub async fn mark_messages_read(
    pool: &SqlitePool,
    sender_id: i64,
    receiver_id: i64,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE messages SET read = TRUE \
         WHERE sender_id = ? AND receiver_id = ? AND read = FALSE",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_messages_between(
    pool: &SqlitePool,
    user_a: i64,
    user_b: i64,
) -> Result<(), ApiError> {
    sqlx::query(
        "DELETE FROM messages \
         WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(user_b)
    .bind(user_a)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{self, users};

    async fn seeded_pool() -> SqlitePool {
        let pool = store::test_pool().await;
        users::create_user(&pool, "alice", "h", b"A").await.unwrap();
        users::create_user(&pool, "bob", "h", b"B").await.unwrap();
        pool
    }

    #[tokio::test]
    async fn save_assigns_id_and_timestamp() {
        let pool = seeded_pool().await;
        let message = save_message(&pool, 1, 2, "text", b"cipher", b"nonce")
            .await
            .unwrap();
        assert_eq!(message.id, 1);
        assert_eq!(message.sender_id, 1);
        assert_eq!(message.receiver_id, 2);
        assert_eq!(message.kind, "text");
        assert_eq!(message.content, b"cipher");
        assert_eq!(message.nonce, b"nonce");
        assert!(!message.read);
    }

    #[tokio::test]
    async fn conversation_is_newest_first_and_symmetric() {
        let pool = seeded_pool().await;
        save_message(&pool, 1, 2, "text", b"one", b"n1").await.unwrap();
        save_message(&pool, 2, 1, "text", b"two", b"n2").await.unwrap();
        save_message(&pool, 1, 2, "file", b"three", b"n3").await.unwrap();

        let from_alice = get_messages_between(&pool, 1, 2, DEFAULT_PAGE_SIZE, 0)
            .await
            .unwrap();
        let from_bob = get_messages_between(&pool, 2, 1, DEFAULT_PAGE_SIZE, 0)
            .await
            .unwrap();
        assert_eq!(from_alice.len(), 3);
        assert_eq!(
            from_alice.iter().map(|m| m.id).collect::<Vec<_>>(),
            from_bob.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        for pair in from_alice.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        let mut ids: Vec<i64> = from_alice.iter().map(|m| m.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn pagination_limits_and_offsets() {
        let pool = seeded_pool().await;
        for i in 0..5 {
            save_message(&pool, 1, 2, "text", format!("m{i}").as_bytes(), b"n")
                .await
                .unwrap();
        }

        let first_page = get_messages_between(&pool, 1, 2, 2, 0).await.unwrap();
        assert_eq!(first_page.len(), 2);
        let second_page = get_messages_between(&pool, 1, 2, 2, 2).await.unwrap();
        assert_eq!(second_page.len(), 2);
        assert_ne!(first_page[0].id, second_page[0].id);

        let empty = get_messages_between(&pool, 1, 2, 2, 10).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn mark_read_targets_one_direction() {
        let pool = seeded_pool().await;
        save_message(&pool, 1, 2, "text", b"to-bob", b"n").await.unwrap();
        save_message(&pool, 2, 1, "text", b"to-alice", b"n").await.unwrap();

        // bob opens the conversation: messages from alice become read
        mark_messages_read(&pool, 1, 2).await.unwrap();

        let messages = get_messages_between(&pool, 1, 2, DEFAULT_PAGE_SIZE, 0)
            .await
            .unwrap();
        for message in messages {
            if message.sender_id == 1 {
                assert!(message.read);
            } else {
                assert!(!message.read);
            }
        }

        // no unread rows left in that direction; still succeeds
        mark_messages_read(&pool, 1, 2).await.unwrap();
    }

    #[tokio::test]
    async fn clearing_removes_both_directions() {
        let pool = seeded_pool().await;
        save_message(&pool, 1, 2, "text", b"a", b"n").await.unwrap();
        save_message(&pool, 2, 1, "text", b"b", b"n").await.unwrap();

        delete_messages_between(&pool, 1, 2).await.unwrap();

        assert!(get_messages_between(&pool, 1, 2, DEFAULT_PAGE_SIZE, 0)
            .await
            .unwrap()
            .is_empty());
        assert!(get_messages_between(&pool, 2, 1, DEFAULT_PAGE_SIZE, 0)
            .await
            .unwrap()
            .is_empty());
    }
}
