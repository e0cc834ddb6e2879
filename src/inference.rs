//! ML inference gateway. The crop and classify models live in a separate
//! service; this module owns the HTTP contract with it and the degraded
//! fallback used when the service is down.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;

use crate::config::INFERENCE_TIMEOUT_SECS;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference service is unreachable: {0}")]
    Unreachable(String),

    #[error("Inference request timed out after {INFERENCE_TIMEOUT_SECS}s")]
    Timeout,

    #[error("Inference service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("Invalid response from inference service: {0}")]
    InvalidResponse(String),
}

/// Outcome of the anemia classifier for one conjunctiva image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub anemic: bool,
    /// Probability assigned to the winning label, in [0, 1].
    pub confidence: f64,
}

/// Seam over the external ML service. Both calls are blocking and are
/// dispatched through `tokio::task::spawn_blocking`.
pub trait InferenceGateway: Send + Sync {
    /// Crop the conjunctiva region out of a full eye photo. Returns the
    /// cropped image bytes.
    fn crop(&self, image: &[u8], filename: &str) -> Result<Vec<u8>, InferenceError>;

    /// Classify a conjunctiva image as anemic or not.
    fn classify(&self, image: &[u8], filename: &str) -> Result<Classification, InferenceError>;
}

/// Classification substituted when the model service cannot answer. The
/// result is synthetic and must always be persisted with a fallback marker
/// so clients can surface the degraded provenance.
pub fn synthesize_fallback() -> Classification {
    let mut rng = rand::thread_rng();
    Classification {
        anemic: rng.gen_bool(0.5),
        confidence: rng.gen_range(0.5..0.9),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP implementation
// ═══════════════════════════════════════════════════════════════════════════

pub struct HttpInferenceGateway {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpInferenceGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(INFERENCE_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn send_image(
        &self,
        path: &str,
        image: &[u8],
        filename: &str,
    ) -> Result<reqwest::blocking::Response, InferenceError> {
        let part = reqwest::blocking::multipart::Part::bytes(image.to_vec())
            .file_name(filename.to_string())
            .mime_str(
                mime_guess::from_path(filename)
                    .first_or_octet_stream()
                    .as_ref(),
            )
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(self.endpoint(path))
            .multipart(form)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else if e.is_connect() {
                    InferenceError::Unreachable(e.to_string())
                } else {
                    InferenceError::Service {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_else(|_| status.to_string());
            return Err(InferenceError::Service {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

impl InferenceGateway for HttpInferenceGateway {
    fn crop(&self, image: &[u8], filename: &str) -> Result<Vec<u8>, InferenceError> {
        let response = self.send_image("crop", image, filename)?;
        let bytes = response
            .bytes()
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        if bytes.is_empty() {
            return Err(InferenceError::InvalidResponse(
                "crop returned an empty body".into(),
            ));
        }
        Ok(bytes.to_vec())
    }

    fn classify(&self, image: &[u8], filename: &str) -> Result<Classification, InferenceError> {
        let response = self.send_image("predict", image, filename)?;
        let parsed: ClassifyResponse = response
            .json()
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        parsed.into_classification()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════════

/// Classifier response shape: `{"detection": "Anemic", "confidence":
/// {"Anemic": 0.82}}`. The confidence map carries the probability of the
/// detected label.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    detection: String,
    #[serde(default)]
    confidence: std::collections::HashMap<String, f64>,
}

impl ClassifyResponse {
    fn into_classification(self) -> Result<Classification, InferenceError> {
        let anemic = match self.detection.as_str() {
            "Anemic" => true,
            "Non-Anemic" => false,
            other => {
                return Err(InferenceError::InvalidResponse(format!(
                    "unknown detection label: {other}"
                )))
            }
        };
        let confidence = self
            .confidence
            .get(&self.detection)
            .copied()
            .or_else(|| self.confidence.values().next().copied())
            .ok_or_else(|| {
                InferenceError::InvalidResponse("missing confidence for detected label".into())
            })?;
        Ok(Classification { anemic, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_response_anemic() {
        let raw = r#"{"detection":"Anemic","confidence":{"Anemic":0.82}}"#;
        let parsed: ClassifyResponse = serde_json::from_str(raw).unwrap();
        let c = parsed.into_classification().unwrap();
        assert!(c.anemic);
        assert!((c.confidence - 0.82).abs() < f64::EPSILON);
    }

    #[test]
    fn classify_response_non_anemic() {
        let raw = r#"{"detection":"Non-Anemic","confidence":{"Non-Anemic":0.97}}"#;
        let parsed: ClassifyResponse = serde_json::from_str(raw).unwrap();
        let c = parsed.into_classification().unwrap();
        assert!(!c.anemic);
    }

    #[test]
    fn classify_response_rejects_unknown_label() {
        let raw = r#"{"detection":"Maybe","confidence":{"Maybe":0.5}}"#;
        let parsed: ClassifyResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.into_classification().is_err());
    }

    #[test]
    fn classify_response_requires_confidence() {
        let raw = r#"{"detection":"Anemic","confidence":{}}"#;
        let parsed: ClassifyResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.into_classification().is_err());
    }

    #[test]
    fn fallback_confidence_stays_in_range() {
        for _ in 0..50 {
            let c = synthesize_fallback();
            assert!(c.confidence >= 0.5 && c.confidence < 0.9);
        }
    }

    #[test]
    fn endpoint_joins_paths() {
        let gateway = HttpInferenceGateway::new("http://localhost:8000/");
        assert_eq!(gateway.endpoint("predict"), "http://localhost:8000/predict");
    }
}
