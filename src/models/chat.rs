use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MessageKind, SenderRole};

/// One conversation thread, owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub created_at: NaiveDateTime,
    /// Must advance on every message append.
    pub updated_at: NaiveDateTime,
}

/// One utterance within a chat session. Append-only; ordered by timestamp
/// ascending within the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub chat_id: i64,
    pub session_id: Uuid,
    pub sender: SenderRole,
    pub message: String,
    pub photo_url: Option<String>,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

/// A message to be appended; chat_id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: Uuid,
    pub sender: SenderRole,
    pub message: String,
    pub photo_url: Option<String>,
    pub kind: MessageKind,
}

impl NewChatMessage {
    pub fn text(session_id: Uuid, sender: SenderRole, message: impl Into<String>) -> Self {
        Self {
            session_id,
            sender,
            message: message.into(),
            photo_url: None,
            kind: MessageKind::Text,
        }
    }

    pub fn image(
        session_id: Uuid,
        sender: SenderRole,
        message: impl Into<String>,
        photo_url: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            sender,
            message: message.into(),
            photo_url: Some(photo_url.into()),
            kind: MessageKind::Image,
        }
    }
}
