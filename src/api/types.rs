use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timestamps arrive as ISO-8601 date-times without an offset
/// (`2024-05-01T10:00:00`); an RFC 3339 form with an offset is accepted too.
pub(crate) mod wire_timestamp {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(with_offset.naive_utc());
        }
        raw.parse::<NaiveDateTime>().map_err(serde::de::Error::custom)
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }
}

/// Cached login identity. Presence of this record is the only authorization
/// check the client performs locally; the server remains the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub username: String,
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    pub session_id: String,
}

/// Reply from `POST /api/chat`. The server may issue a new session id,
/// which replaces the client-generated one from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// One record from `GET /api/knowledge/files`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub filename: String,
    #[serde(with = "wire_timestamp")]
    pub upload_time: NaiveDateTime,
    pub user_id: u64,
}

/// One question/answer pair from the history endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    #[serde(with = "wire_timestamp")]
    pub created_at: NaiveDateTime,
}

/// Session id -> messages in chronological order, as returned by
/// `GET /api/chats/user/{userId}/history`
pub type HistoryMap = HashMap<String, Vec<HistoryEntry>>;

/// A document staged for a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Body of `POST /api/auth/login`
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Reply from `POST /api/auth/login`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReply {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chat_request_uses_camel_case_on_the_wire() {
        let request = ChatRequest {
            question: "Hello".to_string(),
            session_id: "abc-123".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"question": "Hello", "sessionId": "abc-123"})
        );
    }

    #[test]
    fn chat_reply_session_id_is_optional() {
        let reply: ChatReply = serde_json::from_str(r#"{"answer": "Hi there"}"#).unwrap();
        assert_eq!(reply.answer, "Hi there");
        assert_eq!(reply.session_id, None);

        let reply: ChatReply =
            serde_json::from_str(r#"{"answer": "Hi", "sessionId": "abc-123"}"#).unwrap();
        assert_eq!(reply.session_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn file_record_decodes_offsetless_timestamps() {
        // The backend serializes timestamps without an offset
        let record: FileRecord = serde_json::from_str(
            r#"{"filename": "notes.txt", "uploadTime": "2024-05-01T10:00:00", "userId": 7}"#,
        )
        .unwrap();
        assert_eq!(record.filename, "notes.txt");
        assert_eq!(record.user_id, 7);
        assert_eq!(record.upload_time.to_string(), "2024-05-01 10:00:00");
    }

    #[test]
    fn history_entry_decodes_offsetless_timestamps() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{"question": "Hi", "answer": "Hello", "createdAt": "2024-05-01T10:00:00"}"#,
        )
        .unwrap();
        assert_eq!(entry.answer, "Hello");
        assert_eq!(entry.created_at.to_string(), "2024-05-01 10:00:00");
    }

    #[test]
    fn timestamps_with_offsets_are_accepted_too() {
        let record: FileRecord = serde_json::from_str(
            r#"{"filename": "notes.txt", "uploadTime": "2024-05-01T10:00:00Z", "userId": 7}"#,
        )
        .unwrap();
        assert_eq!(record.upload_time.to_string(), "2024-05-01 10:00:00");
    }

    #[test]
    fn history_map_decodes_sessions() {
        let json = r#"{
            "abc-123": [
                {"question": "Hi", "answer": "Hello", "createdAt": "2024-05-01T10:00:00"}
            ]
        }"#;
        let history: HistoryMap = serde_json::from_str(json).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history["abc-123"][0].answer, "Hello");
    }
}
