//! Gemini client. Replies are requested over the streaming endpoint and
//! the streamed fragments are accumulated into one reply string before
//! anything is persisted. Blocking HTTP, called via `spawn_blocking`.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::AssistantError;

const GENERATION_TEMPERATURE: f64 = 0.7;
const GENERATION_TOP_P: f64 = 0.95;
const GENERATION_TOP_K: i64 = 64;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One part of a conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPart {
    Text(String),
    /// Raw image bytes plus mime type; base64-encoded on the wire.
    Image { mime_type: String, data: Vec<u8> },
}

/// One turn of model conversation history. `role` is the gateway role,
/// `"user"` or `"model"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTurn {
    pub role: String,
    pub parts: Vec<TurnPart>,
}

impl ModelTurn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            parts: vec![TurnPart::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: "model".into(),
            parts: vec![TurnPart::Text(text.into())],
        }
    }
}

/// Seam over the generative model. The production implementation talks to
/// Gemini; tests substitute canned or failing models.
pub trait ChatModel: Send + Sync {
    /// Generate one reply given the pinned system instruction and full
    /// conversation history, last turn being the pending user message.
    fn generate(&self, system: &str, history: &[ModelTurn]) -> Result<String, AssistantError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Gemini implementation
// ═══════════════════════════════════════════════════════════════════════════

pub struct GeminiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn stream_endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

impl ChatModel for GeminiClient {
    fn generate(&self, system: &str, history: &[ModelTurn]) -> Result<String, AssistantError> {
        let request = GenerateRequest::new(system, history);

        let response = self
            .client
            .post(self.stream_endpoint())
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout
                } else if e.is_connect() {
                    AssistantError::Unreachable(e.to_string())
                } else {
                    AssistantError::Service {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AssistantError::InvalidResponse(e.to_string()))?;
        if !status.is_success() {
            return Err(AssistantError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(accumulate_sse(&body))
    }
}

/// Collect the text fragments out of a server-sent-events body. Each event
/// line is `data: <json chunk>`; fragments are concatenated in order. A
/// stream with no text fragments yields an empty string, which the caller
/// substitutes with a fixed apology.
fn accumulate_sse(body: &str) -> String {
    let mut reply = String::new();
    for line in body.lines() {
        let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
            continue;
        };
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<GenerateChunk>(payload) else {
            continue;
        };
        for candidate in chunk.candidates {
            for part in candidate.content.parts {
                if let Some(text) = part.text {
                    reply.push_str(&text);
                }
            }
        }
    }
    reply
}

// ═══════════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: WireContent,
    contents: Vec<WireContent>,
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn new(system: &str, history: &[ModelTurn]) -> Self {
        Self {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart::text(system)],
            },
            contents: history.iter().map(WireContent::from_turn).collect(),
            generation_config: GenerationConfig {
                temperature: GENERATION_TEMPERATURE,
                top_p: GENERATION_TOP_P,
                top_k: GENERATION_TOP_K,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: i64,
}

#[derive(Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

impl WireContent {
    fn from_turn(turn: &ModelTurn) -> Self {
        Self {
            role: Some(turn.role.clone()),
            parts: turn
                .parts
                .iter()
                .map(|part| match part {
                    TurnPart::Text(text) => WirePart::text(text),
                    TurnPart::Image { mime_type, data } => WirePart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(data),
                        }),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "inlineData")]
    inline_data: Option<InlineData>,
}

impl WirePart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<ChunkCandidate>,
}

#[derive(Deserialize)]
struct ChunkCandidate {
    #[serde(default)]
    content: ChunkContent,
}

#[derive(Deserialize, Default)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Deserialize)]
struct ChunkPart {
    #[serde(default)]
    text: Option<String>,
}
