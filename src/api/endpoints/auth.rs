//! Identity verification endpoint.
//!
//! `POST /api/auth/verify` — verify the bearer token (done by the auth
//! middleware) and mirror the identity into a local account row. First
//! contact creates the row with a collision-free username; repeats are
//! idempotent.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthedUser};
use crate::db::repository;
use crate::models::{User, DEFAULT_PROFILE_PHOTO};

#[derive(Serialize)]
pub struct VerifyResponse {
    pub user: User,
    /// True when this call created the local account row.
    pub created: bool,
}

pub async fn verify(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
) -> Result<(StatusCode, Json<VerifyResponse>), ApiError> {
    let (user, created) = tokio::task::spawn_blocking(move || sync_local_user(&ctx, &authed))
        .await
        .map_err(|e| ApiError::Internal(format!("sync task failed: {e}")))??;

    let status = if created {
        tracing::info!(uid = %user.uid, username = %user.username, "Local account created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(VerifyResponse { user, created })))
}

fn sync_local_user(ctx: &ApiContext, authed: &AuthedUser) -> Result<(User, bool), ApiError> {
    let conn = ctx.open_db()?;

    if let Some(user) = repository::get_user(&conn, &authed.uid)? {
        return Ok((user, false));
    }

    let base = username_base(authed);
    let username = repository::disambiguate_username(&conn, &base)?;
    let candidate = User {
        uid: authed.uid.clone(),
        username,
        email: authed.email.clone(),
        password: None,
        photo_url: DEFAULT_PROFILE_PHOTO.to_string(),
        birthdate: None,
        created_at: Utc::now().naive_utc(),
    };
    Ok(repository::insert_user_or_repair_race(&conn, &candidate)?)
}

/// Username seed: the provider's display name when present, otherwise the
/// local part of the email address.
fn username_base(authed: &AuthedUser) -> String {
    authed
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            authed
                .email
                .split('@')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("user")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authed(name: Option<&str>, email: &str) -> AuthedUser {
        AuthedUser {
            uid: "u1".into(),
            email: email.into(),
            name: name.map(Into::into),
        }
    }

    #[test]
    fn username_prefers_display_name() {
        assert_eq!(username_base(&authed(Some("Rani"), "rani@example.com")), "Rani");
    }

    #[test]
    fn username_falls_back_to_email_local_part() {
        assert_eq!(username_base(&authed(None, "rani@example.com")), "rani");
        assert_eq!(username_base(&authed(Some("  "), "budi@example.com")), "budi");
    }

    #[test]
    fn username_has_a_last_resort() {
        assert_eq!(username_base(&authed(None, "")), "user");
    }
}
