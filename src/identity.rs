//! External identity provider integration. All account credentials live in
//! the provider; this service only verifies tokens and mirrors profile data
//! locally. The HTTP client is blocking and is always called through
//! `tokio::task::spawn_blocking` from async handlers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider is unreachable: {0}")]
    Unreachable(String),

    #[error("Identity provider timed out")]
    Timeout,

    #[error("Token rejected: {0}")]
    InvalidToken(String),

    #[error("Identity provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid response from identity provider: {0}")]
    InvalidResponse(String),
}

/// Identity attributes asserted by the provider for a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Seam over the identity provider. Implemented over HTTP in production
/// and with in-memory fakes in tests.
pub trait IdentityVerifier: Send + Sync {
    /// Verify a bearer token and return the identity it asserts.
    fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;

    /// Overwrite the password stored at the provider for a user.
    fn set_password(&self, uid: &str, new_password: &str) -> Result<(), IdentityError>;

    /// Delete the account at the provider.
    fn delete_account(&self, uid: &str) -> Result<(), IdentityError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP implementation
// ═══════════════════════════════════════════════════════════════════════════

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpIdentityVerifier {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl HttpIdentityVerifier {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.base_url.trim_end_matches('/'),
            action,
            self.api_key
        )
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        body: &B,
    ) -> Result<R, IdentityError> {
        let response = self
            .client
            .post(self.endpoint(action))
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    IdentityError::Timeout
                } else if e.is_connect() {
                    IdentityError::Unreachable(e.to_string())
                } else {
                    IdentityError::Provider {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ProviderError>()
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::BAD_REQUEST
            {
                return Err(IdentityError::InvalidToken(message));
            }
            return Err(IdentityError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<R>()
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }
}

impl IdentityVerifier for HttpIdentityVerifier {
    fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let body = LookupRequest { id_token: token };
        let response: LookupResponse = self.post("lookup", &body)?;
        let user = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::InvalidToken("token matches no account".into()))?;
        Ok(VerifiedIdentity {
            uid: user.local_id,
            email: user.email,
            name: user.display_name,
        })
    }

    fn set_password(&self, uid: &str, new_password: &str) -> Result<(), IdentityError> {
        let body = UpdateRequest {
            local_id: uid,
            password: new_password,
        };
        let _: serde_json::Value = self.post("update", &body)?;
        Ok(())
    }

    fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        let body = DeleteRequest { local_id: uid };
        let _: serde_json::Value = self.post("delete", &body)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    local_id: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    local_id: &'a str,
}
