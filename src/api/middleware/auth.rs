//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies it against the
//! identity provider, and injects `AuthedUser` into request extensions
//! for downstream handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthedUser};

/// Require a valid bearer token from the identity provider.
///
/// Accesses `ApiContext` from request extensions (injected by the
/// Extension layer). The verifier call is blocking and runs on the
/// blocking thread pool.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let identity = ctx.identity.clone();
    let verified = tokio::task::spawn_blocking(move || identity.verify_token(&token))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))??;

    req.extensions_mut().insert(AuthedUser {
        uid: verified.uid,
        email: verified.email,
        name: verified.name,
    });

    Ok(next.run(req).await)
}
