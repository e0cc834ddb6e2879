use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Ai,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Ai => "ai",
        }
    }

    /// Role vocabulary of the conversational gateway. The gateway calls the
    /// assistant side "model", not "ai".
    pub fn gateway_role(&self) -> &'static str {
        match self {
            SenderRole::User => "user",
            SenderRole::Ai => "model",
        }
    }
}

impl FromStr for SenderRole {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderRole::User),
            "ai" => Ok(SenderRole::Ai),
            other => Err(DatabaseError::InvalidEnum {
                field: "sender".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Content type of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
        }
    }
}

impl FromStr for MessageKind {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            other => Err(DatabaseError::InvalidEnum {
                field: "type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Provenance of a scan verdict: a genuine model inference or the locally
/// synthesized fallback used when the classification service is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Model,
    Fallback,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Model => "model",
            ResultSource::Fallback => "fallback",
        }
    }
}

impl FromStr for ResultSource {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(ResultSource::Model),
            "fallback" => Ok(ResultSource::Fallback),
            other => Err(DatabaseError::InvalidEnum {
                field: "result_source".to_string(),
                value: other.to_string(),
            }),
        }
    }
}
