// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Generic per-workspace key/value table backing migration markers, the
//! thread-storage salt, and anything else that needs a single durable slot.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

pub fn get(conn: &Connection, workspace: &str, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM kv WHERE workspace = ?1 AND key = ?2",
            params![workspace, key],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn set(conn: &Connection, workspace: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv (workspace, key, value) VALUES (?1, ?2, ?3) \
         ON CONFLICT(workspace, key) DO UPDATE SET value = ?3",
        params![workspace, key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkspaceDb;

    #[test]
    fn set_then_get_round_trips() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        set(db.conn(), "ws1", "k", "v1").unwrap();
        assert_eq!(get(db.conn(), "ws1", "k").unwrap(), Some("v1".to_string()));
    }

    #[test]
    fn set_overwrites_existing_value() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        set(db.conn(), "ws1", "k", "v1").unwrap();
        set(db.conn(), "ws1", "k", "v2").unwrap();
        assert_eq!(get(db.conn(), "ws1", "k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn missing_key_returns_none() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        assert_eq!(get(db.conn(), "ws1", "missing").unwrap(), None);
    }
}
