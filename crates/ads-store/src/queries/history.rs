// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! History Store (spec.md §4.F): per-session append-only chat log with
//! idempotent acks and size-bounded trimming.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEDUPE_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub text: String,
    pub ts: String,
    pub kind: Option<String>,
}

/// Append a row. Returns `false` without inserting if `kind` begins with
/// `client_message_id:` and an entry with the same session/kind already
/// exists within [`DEDUPE_WINDOW_SECS`] of `now` — the WebSocket ack path's
/// idempotency guarantee.
pub fn add(
    conn: &Connection,
    session_id: &str,
    role: &str,
    text: &str,
    now: chrono::DateTime<chrono::Utc>,
    kind: Option<&str>,
    max_text_length: usize,
) -> Result<bool> {
    if let Some(k) = kind {
        if k.starts_with("client_message_id:") {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT ts FROM history WHERE session_id = ?1 AND kind = ?2 ORDER BY id DESC LIMIT 1",
                    params![session_id, k],
                    |r| r.get(0),
                )
                .optional()?;
            if let Some(prior_ts) = existing {
                if let Ok(prior) = chrono::DateTime::parse_from_rfc3339(&prior_ts) {
                    if (now - prior.with_timezone(&chrono::Utc)).num_seconds() < DEDUPE_WINDOW_SECS
                    {
                        return Ok(false);
                    }
                }
            }
        }
    }

    let truncated = truncate_with_ellipsis(text, max_text_length);
    conn.execute(
        "INSERT INTO history (session_id, role, text, ts, kind) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, role, truncated, now.to_rfc3339(), kind],
    )?;
    Ok(true)
}

/// Oldest-first rows for a session.
pub fn get(conn: &Connection, session_id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, text, ts, kind FROM history WHERE session_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![session_id], |r| {
            Ok(HistoryEntry {
                id: r.get(0)?,
                session_id: r.get(1)?,
                role: r.get(2)?,
                text: r.get(3)?,
                ts: r.get(4)?,
                kind: r.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Oldest-first rows for a session with `id > after_id` — the Vector
/// Auto-Context indexer's incremental history scan (spec.md §4.O).
pub fn get_after(conn: &Connection, session_id: &str, after_id: i64) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, text, ts, kind FROM history \
         WHERE session_id = ?1 AND id > ?2 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![session_id, after_id], |r| {
            Ok(HistoryEntry {
                id: r.get(0)?,
                session_id: r.get(1)?,
                role: r.get(2)?,
                text: r.get(3)?,
                ts: r.get(4)?,
                kind: r.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// Distinct session ids with at least one row, for the indexer to discover
/// which sessions need a history scan.
pub fn list_session_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT session_id FROM history ORDER BY session_id ASC")?;
    let rows = stmt.query_map([], |r| r.get(0))?.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

/// The most recent `role = "user"` row's text for a session — used to
/// resolve trigger-keyword queries ("continue"/"继续") to the message they
/// stand in for (spec.md §4.O).
pub fn last_user_message(conn: &Connection, session_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT text FROM history WHERE session_id = ?1 AND role = 'user' ORDER BY id DESC LIMIT 1",
            params![session_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Keep only the `max_entries` newest rows for `session_id`; delete the rest
/// in a single transaction.
pub fn trim(conn: &Connection, session_id: &str, max_entries: usize) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let cutoff: Option<i64> = tx
        .query_row(
            "SELECT id FROM history WHERE session_id = ?1 ORDER BY id DESC LIMIT 1 OFFSET ?2",
            params![session_id, max_entries as i64],
            |r| r.get(0),
        )
        .optional()?;

    let deleted = if let Some(cutoff_id) = cutoff {
        tx.execute(
            "DELETE FROM history WHERE session_id = ?1 AND id <= ?2",
            params![session_id, cutoff_id],
        )?
    } else {
        0
    };
    tx.commit()?;
    Ok(deleted)
}

fn truncate_with_ellipsis(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len.saturating_sub(1)).collect();
    format!("{truncated}…")
}
