use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_ts, parse_ts};
use crate::db::DatabaseError;
use crate::models::{ChatMessage, ChatSession, MessageKind, NewChatMessage, SenderRole};

pub fn insert_session(conn: &Connection, session: &ChatSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_sessions (session_id, user_id, title, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            session.session_id.to_string(),
            session.user_id,
            session.title,
            format_ts(&session.created_at),
            format_ts(&session.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_session(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Option<ChatSession>, DatabaseError> {
    let result = conn.query_row(
        "SELECT session_id, user_id, title, created_at, updated_at
         FROM chat_sessions WHERE session_id = ?1",
        params![session_id.to_string()],
        session_from_row,
    );

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All sessions owned by a user, most recently active first.
pub fn get_sessions_by_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<ChatSession>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, user_id, title, created_at, updated_at
         FROM chat_sessions WHERE user_id = ?1 ORDER BY updated_at DESC",
    )?;
    let rows = stmt.query_map(params![user_id], session_from_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

/// Advance the session's updated timestamp. Called on every message append.
pub fn touch_session(
    conn: &Connection,
    session_id: &Uuid,
    at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE chat_sessions SET updated_at = ?1 WHERE session_id = ?2",
        params![format_ts(&at), session_id.to_string()],
    )?;
    Ok(())
}

/// Delete a session and its messages: messages first, then the session row.
pub fn delete_session(conn: &Connection, session_id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM chats WHERE session_id = ?1",
        params![session_id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM chat_sessions WHERE session_id = ?1",
        params![session_id.to_string()],
    )?;
    Ok(())
}

pub fn insert_message(
    conn: &Connection,
    msg: &NewChatMessage,
    at: NaiveDateTime,
) -> Result<ChatMessage, DatabaseError> {
    // Truncate to stored precision so the returned message matches a re-read.
    let at = parse_ts(&format_ts(&at));
    conn.execute(
        "INSERT INTO chats (session_id, sender, message, photo_url, timestamp, type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            msg.session_id.to_string(),
            msg.sender.as_str(),
            msg.message,
            msg.photo_url,
            format_ts(&at),
            msg.kind.as_str(),
        ],
    )?;
    let chat_id = conn.last_insert_rowid();
    Ok(ChatMessage {
        chat_id,
        session_id: msg.session_id,
        sender: msg.sender,
        message: msg.message.clone(),
        photo_url: msg.photo_url.clone(),
        timestamp: at,
        kind: msg.kind,
    })
}

/// All messages of a session, timestamp ascending (insertion order).
pub fn get_messages_by_session(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, session_id, sender, message, photo_url, timestamp, type
         FROM chats WHERE session_id = ?1 ORDER BY timestamp ASC, chat_id ASC",
    )?;

    let rows = stmt.query_map(params![session_id.to_string()], |row| {
        Ok(MessageRow {
            chat_id: row.get(0)?,
            session_id: row.get(1)?,
            sender: row.get(2)?,
            message: row.get(3)?,
            photo_url: row.get(4)?,
            timestamp: row.get(5)?,
            kind: row.get(6)?,
        })
    })?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(message_from_row(row?)?);
    }
    Ok(messages)
}

struct MessageRow {
    chat_id: i64,
    session_id: String,
    sender: String,
    message: String,
    photo_url: Option<String>,
    timestamp: String,
    kind: String,
}

fn message_from_row(row: MessageRow) -> Result<ChatMessage, DatabaseError> {
    Ok(ChatMessage {
        chat_id: row.chat_id,
        session_id: Uuid::parse_str(&row.session_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        sender: SenderRole::from_str(&row.sender)?,
        message: row.message,
        photo_url: row.photo_url,
        timestamp: parse_ts(&row.timestamp),
        kind: MessageKind::from_str(&row.kind)?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> Result<ChatSession, rusqlite::Error> {
    Ok(ChatSession {
        session_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_ts(&row.get::<_, String>(3)?),
        updated_at: parse_ts(&row.get::<_, String>(4)?),
    })
}
