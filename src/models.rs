use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::codec;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    #[sqlx(default)]
    pub password_hash: String,
    #[serde(with = "codec::b64")]
    pub public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    #[serde(with = "codec::b64")]
    pub content: Vec<u8>,
    #[serde(with = "codec::b64")]
    pub nonce: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invite {
    pub id: i64,
    pub code: String,
    pub used_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_serialization_hides_password_hash() {
        let user = User {
            id: 1,
            username: "alice".to_string(),
            password_hash: "secret-hash".to_string(),
            public_key: b"key".to_vec(),
            created_at: Utc::now(),
            last_seen: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["public_key"], "a2V5");
    }

    #[test]
    fn message_blobs_travel_as_base64() {
        let message = Message {
            id: 7,
            sender_id: 1,
            receiver_id: 2,
            kind: "text".to_string(),
            content: b"cipher".to_vec(),
            nonce: b"nonce".to_vec(),
            timestamp: Utc::now(),
            read: false,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "Y2lwaGVy");
        assert_eq!(json["nonce"], "bm9uY2U=");
    }
}
