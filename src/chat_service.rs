//! Chat orchestration. Sessions are seeded from a scan, every exchange is
//! persisted before it is returned, and model history lives in the
//! conversation cache with a rebuild path from persisted messages.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::assistant::gemini::{ModelTurn, TurnPart};
use crate::assistant::prompt::{
    scan_opening_prompt, scan_report, APOLOGY_FALLBACK, SCAN_IMAGE_CAPTION, SESSION_TITLE,
    SYSTEM_INSTRUCTION, WELCOME_MESSAGE,
};
use crate::assistant::{AssistantError, ChatModel, ConversationCache};
use crate::db::{repository, DatabaseError};
use crate::models::{ChatMessage, ChatSession, NewChatMessage, SenderRole, User};
use crate::storage::ImageStore;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Scan not found: {0}")]
    ScanNotFound(String),

    #[error("No scan available for this user")]
    NoScanForUser,

    #[error("Chat session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Chat session belongs to another user")]
    NotSessionOwner,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Assistant(#[from] AssistantError),
}

/// A freshly started session together with its seeded messages.
#[derive(Debug)]
pub struct StartedChat {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

/// One completed exchange: the persisted user message and the reply.
#[derive(Debug)]
pub struct Exchange {
    pub user_message: ChatMessage,
    pub ai_message: ChatMessage,
}

/// Start a session anchored to an explicit scan. The scan is described to
/// the model as a textual prompt against empty history; the prompt and the
/// reply become the session's first two messages.
pub fn start_from_scan(
    conn: &Connection,
    model: &dyn ChatModel,
    cache: &ConversationCache,
    user: &User,
    scan_id: &str,
) -> Result<StartedChat, ChatError> {
    let scan = repository::get_scan(conn, scan_id)?
        .ok_or_else(|| ChatError::ScanNotFound(scan_id.to_string()))?;

    let prompt = scan_opening_prompt(user, &scan, Utc::now().date_naive());
    let opening_turn = ModelTurn::user_text(prompt.clone());
    let reply = generate_reply(model, std::slice::from_ref(&opening_turn))?;

    let session = new_session(conn, user)?;
    let now = session.created_at;
    let prompt_msg = repository::insert_message(
        conn,
        &NewChatMessage::text(session.session_id, SenderRole::User, prompt),
        now,
    )?;
    let reply_msg = repository::insert_message(
        conn,
        &NewChatMessage::text(session.session_id, SenderRole::Ai, reply.clone()),
        now + Duration::milliseconds(1),
    )?;
    repository::touch_session(conn, &session.session_id, reply_msg.timestamp)?;

    cache.put(
        session.session_id,
        vec![opening_turn, ModelTurn::model_text(reply)],
    );

    finish_start(conn, session, vec![prompt_msg, reply_msg])
}

/// Start a session from the caller's most recent scan. Seeds three
/// messages: the scan image, the model's opening advice (generated from
/// the report plus the inline image), and the fixed greeting.
pub fn start_generic(
    conn: &Connection,
    store: &ImageStore,
    model: &dyn ChatModel,
    cache: &ConversationCache,
    user: &User,
) -> Result<StartedChat, ChatError> {
    let scan =
        repository::latest_scan_for_user(conn, &user.uid)?.ok_or(ChatError::NoScanForUser)?;

    let report = scan_report(user, &scan, Utc::now().date_naive());
    let opening_turn = ModelTurn {
        role: "user".into(),
        parts: image_and_text_parts(store, &scan.photo_url, &report),
    };
    let advice = generate_reply(model, std::slice::from_ref(&opening_turn))?;

    let session = new_session(conn, user)?;
    let now = session.created_at;
    let image_msg = repository::insert_message(
        conn,
        &NewChatMessage::image(
            session.session_id,
            SenderRole::User,
            SCAN_IMAGE_CAPTION,
            scan.photo_url.clone(),
        ),
        now,
    )?;
    let advice_msg = repository::insert_message(
        conn,
        &NewChatMessage::text(session.session_id, SenderRole::Ai, advice.clone()),
        now + Duration::milliseconds(1),
    )?;
    let welcome_msg = repository::insert_message(
        conn,
        &NewChatMessage::text(session.session_id, SenderRole::Ai, WELCOME_MESSAGE),
        now + Duration::milliseconds(2),
    )?;
    repository::touch_session(conn, &session.session_id, welcome_msg.timestamp)?;

    cache.put(
        session.session_id,
        vec![
            opening_turn,
            ModelTurn::model_text(advice),
            ModelTurn::model_text(WELCOME_MESSAGE),
        ],
    );

    finish_start(conn, session, vec![image_msg, advice_msg, welcome_msg])
}

fn new_session(conn: &Connection, user: &User) -> Result<ChatSession, ChatError> {
    let now = Utc::now().naive_utc();
    let session = ChatSession {
        session_id: Uuid::new_v4(),
        user_id: user.uid.clone(),
        title: SESSION_TITLE.to_string(),
        created_at: now,
        updated_at: now,
    };
    repository::insert_session(conn, &session)?;
    Ok(session)
}

/// Request one reply. A blank reply is substituted with the fixed apology;
/// a gateway failure is propagated to the caller.
fn generate_reply(model: &dyn ChatModel, history: &[ModelTurn]) -> Result<String, ChatError> {
    match model.generate(SYSTEM_INSTRUCTION, history) {
        Ok(reply) => Ok(non_blank_or_apology(reply)),
        Err(e) => {
            tracing::warn!(error = %e, "Reply generation failed");
            Err(e.into())
        }
    }
}

fn finish_start(
    conn: &Connection,
    session: ChatSession,
    messages: Vec<ChatMessage>,
) -> Result<StartedChat, ChatError> {
    let session = repository::get_session(conn, &session.session_id)?
        .ok_or(ChatError::SessionNotFound(session.session_id))?;
    Ok(StartedChat { session, messages })
}

/// Append a user message and generate the reply.
pub fn send_message(
    conn: &Connection,
    store: &ImageStore,
    model: &dyn ChatModel,
    cache: &ConversationCache,
    user: &User,
    session_id: Uuid,
    text: &str,
) -> Result<Exchange, ChatError> {
    let session = owned_session(conn, user, session_id)?;

    let mut history = match cache.get(session_id) {
        Some(turns) => turns,
        None => rebuild_history(conn, store, session_id)?,
    };

    // The user's message is durable even when the gateway then fails.
    let user_message = repository::insert_message(
        conn,
        &NewChatMessage::text(session_id, SenderRole::User, text),
        Utc::now().naive_utc(),
    )?;
    history.push(ModelTurn::user_text(text));

    let reply = match generate_reply(model, &history) {
        Ok(reply) => reply,
        Err(e) => {
            // Cached history no longer matches the persisted messages;
            // drop it so the next send rebuilds from the database.
            cache.remove(session_id);
            return Err(e);
        }
    };

    let ai_message = repository::insert_message(
        conn,
        &NewChatMessage::text(session_id, SenderRole::Ai, reply.clone()),
        user_message.timestamp + Duration::milliseconds(1),
    )?;
    repository::touch_session(conn, &session.session_id, ai_message.timestamp)?;

    history.push(ModelTurn::model_text(reply));
    cache.put(session_id, history);

    Ok(Exchange {
        user_message,
        ai_message,
    })
}

/// Messages of an owned session, oldest first.
pub fn get_history(
    conn: &Connection,
    user: &User,
    session_id: Uuid,
) -> Result<Vec<ChatMessage>, ChatError> {
    owned_session(conn, user, session_id)?;
    Ok(repository::get_messages_by_session(conn, &session_id)?)
}

/// All sessions owned by the caller, most recently active first.
pub fn list_sessions(conn: &Connection, user: &User) -> Result<Vec<ChatSession>, ChatError> {
    Ok(repository::get_sessions_by_user(conn, &user.uid)?)
}

/// Delete an owned session, its messages, and its cached history.
pub fn delete_chat(
    conn: &Connection,
    cache: &ConversationCache,
    user: &User,
    session_id: Uuid,
) -> Result<(), ChatError> {
    owned_session(conn, user, session_id)?;
    repository::delete_session(conn, &session_id)?;
    cache.remove(session_id);
    Ok(())
}

fn owned_session(
    conn: &Connection,
    user: &User,
    session_id: Uuid,
) -> Result<ChatSession, ChatError> {
    let session = repository::get_session(conn, &session_id)?
        .ok_or(ChatError::SessionNotFound(session_id))?;
    if session.user_id != user.uid {
        return Err(ChatError::NotSessionOwner);
    }
    Ok(session)
}

/// Reconstruct model history from persisted messages after a cache miss.
/// Image messages are re-read from disk when possible and downgraded to
/// their caption when the file is gone.
fn rebuild_history(
    conn: &Connection,
    store: &ImageStore,
    session_id: Uuid,
) -> Result<Vec<ModelTurn>, ChatError> {
    let messages = repository::get_messages_by_session(conn, &session_id)?;
    let mut turns = Vec::with_capacity(messages.len());
    for msg in &messages {
        let parts = match &msg.photo_url {
            Some(url) => image_and_text_parts(store, url, &msg.message),
            None => vec![TurnPart::Text(msg.message.clone())],
        };
        turns.push(ModelTurn {
            role: msg.sender.gateway_role().to_string(),
            parts,
        });
    }
    Ok(turns)
}

fn image_and_text_parts(store: &ImageStore, photo_url: &str, text: &str) -> Vec<TurnPart> {
    let mut parts = Vec::with_capacity(2);
    match store.read_by_url(photo_url) {
        Ok(bytes) => parts.push(TurnPart::Image {
            mime_type: mime_guess::from_path(photo_url)
                .first_or_octet_stream()
                .to_string(),
            data: bytes,
        }),
        Err(e) => {
            tracing::warn!(photo_url, error = %e, "Image unavailable for model turn");
        }
    }
    parts.push(TurnPart::Text(text.to_string()));
    parts
}

fn non_blank_or_apology(reply: String) -> String {
    if reply.trim().is_empty() {
        APOLOGY_FALLBACK.to_string()
    } else {
        reply
    }
}
