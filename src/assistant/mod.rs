//! Conversational assistant built on an external generative model. The
//! chat service composes prompts from scan results and user profiles,
//! keeps per-session model history in a cache, and persists every
//! exchanged message.

pub mod conversation;
pub mod gemini;
pub mod prompt;

pub use conversation::ConversationCache;
pub use gemini::{ChatModel, GeminiClient, ModelTurn, TurnPart};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Model service is unreachable: {0}")]
    Unreachable(String),

    #[error("Model request timed out")]
    Timeout,

    #[error("Model service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("Invalid response from model service: {0}")]
    InvalidResponse(String),
}
