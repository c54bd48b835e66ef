// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Attachment Store (spec.md §3): content-addressed blob metadata. The
//! blobs themselves live under `<workspace>/.ads/attachments/<sha256>.bin`;
//! this table only tracks the metadata rows.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub task_id: Option<String>,
    pub sha256: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub filename: Option<String>,
    pub storage_url: String,
    pub created_at: String,
}

fn row_to_attachment(r: &rusqlite::Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: r.get(0)?,
        task_id: r.get(1)?,
        sha256: r.get(2)?,
        content_type: r.get(3)?,
        size_bytes: r.get(4)?,
        width: r.get(5)?,
        height: r.get(6)?,
        filename: r.get(7)?,
        storage_url: r.get(8)?,
        created_at: r.get(9)?,
    })
}

const ATTACHMENT_COLUMNS: &str =
    "id, task_id, sha256, content_type, size_bytes, width, height, filename, storage_url, created_at";

pub fn create(conn: &Connection, id: &str, task_id: Option<&str>, sha256: &str, content_type: &str, size_bytes: i64, width: Option<i64>, height: Option<i64>, filename: Option<&str>, storage_url: &str, now: chrono::DateTime<chrono::Utc>) -> Result<Attachment> {
    conn.execute(
        "INSERT INTO attachments (id, task_id, sha256, content_type, size_bytes, width, height, \
         filename, storage_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![id, task_id, sha256, content_type, size_bytes, width, height, filename, storage_url, now.to_rfc3339()],
    )?;
    get(conn, id)?.ok_or_else(|| crate::error::StorageError::NotFound(id.to_string()))
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Attachment>> {
    Ok(conn
        .query_row(&format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?1"), params![id], row_to_attachment)
        .optional()?)
}

pub fn list_for_task(conn: &Connection, task_id: &str) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(&format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE task_id = ?1 ORDER BY created_at ASC"))?;
    let rows = stmt
        .query_map(params![task_id], row_to_attachment)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkspaceDb;

    #[test]
    fn create_then_get_round_trips() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create(db.conn(), "a1", Some("t1"), "deadbeef", "image/png", 1024, Some(64), Some(64), Some("x.png"), "/ws/.ads/attachments/deadbeef.bin", chrono::Utc::now()).unwrap();
        let found = get(db.conn(), "a1").unwrap().unwrap();
        assert_eq!(found.sha256, "deadbeef");
        assert_eq!(list_for_task(db.conn(), "t1").unwrap().len(), 1);
    }
}
