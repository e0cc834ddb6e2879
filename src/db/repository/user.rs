use rusqlite::{params, Connection};

use super::{format_ts, parse_ts};
use crate::db::DatabaseError;
use crate::models::{User, UserProfileUpdate};

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (uid, username, email, password, photo_url, birthdate, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.uid,
            user.username,
            user.email,
            user.password,
            user.photo_url,
            user.birthdate.map(|d| d.to_string()),
            format_ts(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, uid: &str) -> Result<Option<User>, DatabaseError> {
    fetch_one(conn, "SELECT uid, username, email, password, photo_url, birthdate, created_at FROM users WHERE uid = ?1", uid)
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<User>, DatabaseError> {
    fetch_one(conn, "SELECT uid, username, email, password, photo_url, birthdate, created_at FROM users WHERE username = ?1", username)
}

fn fetch_one(conn: &Connection, sql: &str, key: &str) -> Result<Option<User>, DatabaseError> {
    let result = conn.query_row(sql, params![key], user_from_row);
    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Derive a unique username from a base by appending an incrementing
/// counter on collision: `base`, `base1`, `base2`, ...
pub fn disambiguate_username(conn: &Connection, base: &str) -> Result<String, DatabaseError> {
    let mut candidate = base.to_string();
    let mut counter = 1u32;
    while get_user_by_username(conn, &candidate)?.is_some() {
        candidate = format!("{base}{counter}");
        counter += 1;
    }
    Ok(candidate)
}

/// Insert a user; on a unique-constraint race with a concurrent identical
/// request, re-read the row and treat it as idempotent success.
///
/// Returns `(user, created)` where `created` is false when the row already
/// existed. A conflict whose re-read still finds nothing is a fatal anomaly
/// and is surfaced as the original constraint error.
pub fn insert_user_or_repair_race(
    conn: &Connection,
    user: &User,
) -> Result<(User, bool), DatabaseError> {
    match insert_user(conn, user) {
        Ok(()) => Ok((user.clone(), true)),
        Err(e) if e.is_unique_violation() => {
            tracing::debug!(uid = %user.uid, "User insert conflicted; re-reading");
            match get_user(conn, &user.uid)? {
                Some(existing) => Ok((existing, false)),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Apply a partial profile update from the closed field set. Returns the
/// updated row, or None when the user does not exist.
pub fn update_user_profile(
    conn: &Connection,
    uid: &str,
    update: &UserProfileUpdate,
) -> Result<Option<User>, DatabaseError> {
    if let Some(username) = &update.username {
        conn.execute(
            "UPDATE users SET username = ?1 WHERE uid = ?2",
            params![username, uid],
        )?;
    }
    if let Some(birthdate) = &update.birthdate {
        conn.execute(
            "UPDATE users SET birthdate = ?1 WHERE uid = ?2",
            params![birthdate.to_string(), uid],
        )?;
    }
    get_user(conn, uid)
}

pub fn update_user_photo(
    conn: &Connection,
    uid: &str,
    photo_url: &str,
) -> Result<Option<User>, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET photo_url = ?1 WHERE uid = ?2",
        params![photo_url, uid],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_user(conn, uid)
}

pub fn update_user_password(
    conn: &Connection,
    uid: &str,
    password: &str,
) -> Result<Option<User>, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password = ?1 WHERE uid = ?2",
        params![password, uid],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_user(conn, uid)
}

/// Delete a user row. Returns the deleted row, or None if absent.
pub fn delete_user(conn: &Connection, uid: &str) -> Result<Option<User>, DatabaseError> {
    let existing = get_user(conn, uid)?;
    if existing.is_some() {
        conn.execute("DELETE FROM users WHERE uid = ?1", params![uid])?;
    }
    Ok(existing)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<User, rusqlite::Error> {
    let birthdate: Option<String> = row.get(5)?;
    Ok(User {
        uid: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        photo_url: row.get(4)?,
        birthdate: birthdate.and_then(|s| s.parse().ok()),
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}
