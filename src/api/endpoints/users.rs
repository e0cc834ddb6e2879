//! User profile endpoints. All operations act on the caller's own
//! account; addressing another uid is rejected.

use axum::extract::{Multipart, Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthedUser};
use crate::db::repository;
use crate::models::{User, UserProfileUpdate, DEFAULT_PROFILE_PHOTO};
use crate::storage::extension_of;

const MIN_PASSWORD_LEN: usize = 6;

fn require_self(authed: &AuthedUser, uid: &str) -> Result<(), ApiError> {
    if authed.uid != uid {
        return Err(ApiError::Forbidden(
            "Cannot operate on another user's account".into(),
        ));
    }
    Ok(())
}

/// `GET /api/users/:uid` — the caller's profile.
pub async fn get_profile(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(uid): Path<String>,
) -> Result<Json<User>, ApiError> {
    require_self(&authed, &uid)?;
    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = ctx.open_db()?;
        repository::get_user(&conn, &uid)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("profile task failed: {e}")))??;
    Ok(Json(user))
}

/// `PUT /api/users/:uid` — partial profile update (username, birthdate).
pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(uid): Path<String>,
    Json(update): Json<UserProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    require_self(&authed, &uid)?;
    if update.is_empty() {
        return Err(ApiError::BadRequest("No updatable fields given".into()));
    }
    if let Some(username) = &update.username {
        if username.trim().is_empty() {
            return Err(ApiError::BadRequest("Username cannot be empty".into()));
        }
    }

    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = ctx.open_db()?;
        match repository::update_user_profile(&conn, &uid, &update) {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(ApiError::NotFound(format!("User not found: {uid}"))),
            Err(e) if e.is_unique_violation() => {
                Err(ApiError::BadRequest("Username already taken".into()))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await
    .map_err(|e| ApiError::Internal(format!("update task failed: {e}")))??;
    Ok(Json(user))
}

/// `POST /api/users/:uid/photo` — replace the profile photo. The previous
/// custom photo file is removed; the shared default is never deleted.
pub async fn upload_photo(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(uid): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<User>, ApiError> {
    require_self(&authed, &uid)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("photo.jpg").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing 'image' field".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }

    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = ctx.open_db()?;
        let existing = repository::get_user(&conn, &uid)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))?;

        let extension = extension_of(&filename).to_lowercase();
        let photo_url = ctx
            .store
            .save_profile_photo(&uid, &extension, &bytes)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        if is_deletable_photo(&existing.photo_url) && existing.photo_url != photo_url {
            ctx.store.delete_by_url(&existing.photo_url);
        }

        repository::update_user_photo(&conn, &uid, &photo_url)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("photo task failed: {e}")))??;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct LinkPasswordRequest {
    pub password: String,
}

/// `POST /api/users/:uid/password` — add a password credential to an
/// account created through a federated provider. Rejected when the
/// account already has one.
pub async fn link_password(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(uid): Path<String>,
    Json(req): Json<LinkPasswordRequest>,
) -> Result<Json<User>, ApiError> {
    require_self(&authed, &uid)?;
    check_password_length(&req.password)?;

    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = ctx.open_db()?;
        let existing = repository::get_user(&conn, &uid)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))?;
        if existing.password.is_some() {
            return Err(ApiError::BadRequest(
                "User already has email/password authentication".into(),
            ));
        }

        ctx.identity.set_password(&uid, &req.password)?;
        repository::update_user_password(&conn, &uid, &req.password)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("password task failed: {e}")))??;
    Ok(Json(user))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub new_password: String,
}

/// `PUT /api/users/:uid/password` — overwrite an existing password
/// credential at the provider and mirror it locally.
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(uid): Path<String>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<User>, ApiError> {
    require_self(&authed, &uid)?;
    check_password_length(&req.new_password)?;

    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = ctx.open_db()?;
        let existing = repository::get_user(&conn, &uid)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))?;
        if existing.password.is_none() {
            return Err(ApiError::BadRequest(
                "User does not have email/password authentication to reset".into(),
            ));
        }

        ctx.identity.set_password(&uid, &req.new_password)?;
        repository::update_user_password(&conn, &uid, &req.new_password)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("password task failed: {e}")))??;
    Ok(Json(user))
}

fn check_password_length(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// `DELETE /api/users/:uid` — remove the account.
///
/// Order: photo file cleanup, local row delete, then provider delete. A
/// provider failure after the local delete is reported as a partial
/// deletion so the orphaned provider account can be cleaned up manually.
pub async fn delete_account(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(uid): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    require_self(&authed, &uid)?;

    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let conn = ctx.open_db()?;
        let deleted = repository::delete_user(&conn, &uid)?
            .ok_or_else(|| ApiError::NotFound(format!("User not found: {uid}")))?;

        if is_deletable_photo(&deleted.photo_url) {
            ctx.store.delete_by_url(&deleted.photo_url);
        }

        ctx.identity.delete_account(&uid).map_err(|e| {
            ApiError::PartialDeletion(format!("provider delete failed for {uid}: {e}"))
        })?;
        tracing::info!(uid, "Account deleted");
        Ok(())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("delete task failed: {e}")))??;
    Ok(Json(DeleteResponse { deleted: true }))
}

/// Only locally stored custom photos are deletable: the shared default and
/// external (http) provider photos are left alone.
fn is_deletable_photo(photo_url: &str) -> bool {
    photo_url != DEFAULT_PROFILE_PHOTO && !photo_url.starts_with("http")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_external_photos_are_protected() {
        assert!(!is_deletable_photo(DEFAULT_PROFILE_PHOTO));
        assert!(!is_deletable_photo("https://cdn.example.com/avatar.png"));
        assert!(is_deletable_photo("/profiles/photo-u1.jpg"));
    }

    #[test]
    fn self_check_rejects_other_uids() {
        let authed = AuthedUser {
            uid: "u1".into(),
            email: "a@b.c".into(),
            name: None,
        };
        assert!(require_self(&authed, "u1").is_ok());
        assert!(matches!(
            require_self(&authed, "u2"),
            Err(ApiError::Forbidden(_))
        ));
    }
}
