//! Chat endpoints.
//!
//! - `POST /api/chats` — start a session from the caller's latest scan
//! - `POST /api/chats/from-scan` — start a session from an explicit scan
//! - `GET /api/chats` — list the caller's sessions
//! - `GET /api/chats/:session_id` — session history
//! - `POST /api/chats/:session_id/messages` — send a message
//! - `DELETE /api/chats/:session_id` — delete a session

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthedUser};
use crate::chat_service;
use crate::db::repository;
use crate::models::{ChatMessage, ChatSession, User};

const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Serialize)]
pub struct StartedChatResponse {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFromScanRequest {
    pub scan_id: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeResponse {
    pub user_message: ChatMessage,
    pub ai_message: ChatMessage,
}

fn local_user(ctx: &ApiContext, authed: &AuthedUser) -> Result<User, ApiError> {
    let conn = ctx.open_db()?;
    repository::get_user(&conn, &authed.uid)?
        .ok_or_else(|| ApiError::NotFound(format!("User not found: {}", authed.uid)))
}

/// `POST /api/chats` — start from the caller's most recent scan.
pub async fn start(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
) -> Result<(StatusCode, Json<StartedChatResponse>), ApiError> {
    let started = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let user = local_user(&ctx, &authed)?;
        let conn = ctx.open_db()?;
        chat_service::start_generic(
            &conn,
            &ctx.store,
            ctx.model.as_ref(),
            &ctx.conversations,
            &user,
        )
        .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("start task failed: {e}")))??;

    Ok((
        StatusCode::CREATED,
        Json(StartedChatResponse {
            session: started.session,
            messages: started.messages,
        }),
    ))
}

/// `POST /api/chats/from-scan` — start from an explicit scan.
pub async fn start_from_scan(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Json(req): Json<StartFromScanRequest>,
) -> Result<(StatusCode, Json<StartedChatResponse>), ApiError> {
    let started = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let user = local_user(&ctx, &authed)?;
        let conn = ctx.open_db()?;
        chat_service::start_from_scan(
            &conn,
            ctx.model.as_ref(),
            &ctx.conversations,
            &user,
            &req.scan_id,
        )
        .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("start task failed: {e}")))??;

    Ok((
        StatusCode::CREATED,
        Json(StartedChatResponse {
            session: started.session,
            messages: started.messages,
        }),
    ))
}

/// `GET /api/chats` — the caller's sessions, most recently active first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
) -> Result<Json<Vec<ChatSession>>, ApiError> {
    let sessions = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let user = local_user(&ctx, &authed)?;
        let conn = ctx.open_db()?;
        chat_service::list_sessions(&conn, &user).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("list task failed: {e}")))??;
    Ok(Json(sessions))
}

/// `GET /api/chats/:session_id` — full message history of an owned session.
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let user = local_user(&ctx, &authed)?;
        let conn = ctx.open_db()?;
        chat_service::get_history(&conn, &user, session_id).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("history task failed: {e}")))??;
    Ok(Json(messages))
}

/// `POST /api/chats/:session_id/messages` — send a message, get the reply.
pub async fn send(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ExchangeResponse>, ApiError> {
    let text = req.message.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".into()));
    }
    if text.len() > MAX_MESSAGE_LEN {
        return Err(ApiError::BadRequest(format!(
            "Message too long (max {MAX_MESSAGE_LEN} chars)"
        )));
    }

    let exchange = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let user = local_user(&ctx, &authed)?;
        let conn = ctx.open_db()?;
        chat_service::send_message(
            &conn,
            &ctx.store,
            ctx.model.as_ref(),
            &ctx.conversations,
            &user,
            session_id,
            &text,
        )
        .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("send task failed: {e}")))??;

    Ok(Json(ExchangeResponse {
        user_message: exchange.user_message,
        ai_message: exchange.ai_message,
    }))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// `DELETE /api/chats/:session_id` — delete an owned session.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(authed): Extension<AuthedUser>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        let user = local_user(&ctx, &authed)?;
        let conn = ctx.open_db()?;
        chat_service::delete_chat(&conn, &ctx.conversations, &user, session_id)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("delete task failed: {e}")))??;
    Ok(Json(DeletedResponse { deleted: true }))
}
