// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session Store (spec.md §3): HTTP login sessions keyed by `token_hash`.
//! Lookup never compares plaintext tokens — callers hash the raw cookie
//! value first and look up the row by the resulting hash (invariant 3).

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub created_at: String,
    pub expires_at: String,
    pub revoked_at: Option<String>,
    pub last_seen_at: String,
    pub last_seen_ip: Option<String>,
    pub user_agent: Option<String>,
}

fn row_to_session(r: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: r.get(0)?,
        user_id: r.get(1)?,
        token_hash: r.get(2)?,
        created_at: r.get(3)?,
        expires_at: r.get(4)?,
        revoked_at: r.get(5)?,
        last_seen_at: r.get(6)?,
        last_seen_ip: r.get(7)?,
        user_agent: r.get(8)?,
    })
}

const SESSION_COLUMNS: &str =
    "id, user_id, token_hash, created_at, expires_at, revoked_at, last_seen_at, last_seen_ip, user_agent";

pub fn create(
    conn: &Connection,
    id: &str,
    user_id: &str,
    token_hash: &str,
    now: chrono::DateTime<chrono::Utc>,
    ttl_secs: i64,
    user_agent: Option<&str>,
) -> Result<Session> {
    let now_str = now.to_rfc3339();
    let expires_at = (now + chrono::Duration::seconds(ttl_secs)).to_rfc3339();
    conn.execute(
        "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at, revoked_at, \
         last_seen_at, last_seen_ip, user_agent) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?4, NULL, ?6)",
        params![id, user_id, token_hash, now_str, expires_at, user_agent],
    )?;
    get_by_token_hash(conn, token_hash)?.ok_or_else(|| crate::error::StorageError::NotFound(id.to_string()))
}

/// The only lookup path: by `token_hash`, never by the raw token.
pub fn get_by_token_hash(conn: &Connection, token_hash: &str) -> Result<Option<Session>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token_hash = ?1"),
            params![token_hash],
            row_to_session,
        )
        .optional()?)
}

/// A session is usable iff it exists, is unrevoked, and unexpired.
pub fn find_active(
    conn: &Connection,
    token_hash: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Option<Session>> {
    let Some(session) = get_by_token_hash(conn, token_hash)? else { return Ok(None) };
    if session.revoked_at.is_some() {
        return Ok(None);
    }
    let expires_at = chrono::DateTime::parse_from_rfc3339(&session.expires_at)
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or(now);
    if expires_at <= now {
        return Ok(None);
    }
    Ok(Some(session))
}

pub fn touch_last_seen(
    conn: &Connection,
    token_hash: &str,
    now: chrono::DateTime<chrono::Utc>,
    ip: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET last_seen_at = ?2, last_seen_ip = COALESCE(?3, last_seen_ip) WHERE token_hash = ?1",
        params![token_hash, now.to_rfc3339(), ip],
    )?;
    Ok(())
}

pub fn revoke_by_token_hash(conn: &Connection, token_hash: &str, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET revoked_at = ?2 WHERE token_hash = ?1 AND revoked_at IS NULL",
        params![token_hash, now.to_rfc3339()],
    )?;
    Ok(())
}
