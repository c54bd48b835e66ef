// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Project Store (spec.md §3/§4.N): per-user workspace bookmarks with a
//! persisted `sort_order`, backing `/api/projects` and `/api/projects/reorder`.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub user_id: String,
    pub project_id: String,
    pub workspace_root: String,
    pub display_name: String,
    pub chat_session_id: Option<String>,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_project(r: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        user_id: r.get(0)?,
        project_id: r.get(1)?,
        workspace_root: r.get(2)?,
        display_name: r.get(3)?,
        chat_session_id: r.get(4)?,
        sort_order: r.get(5)?,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

const PROJECT_COLUMNS: &str =
    "user_id, project_id, workspace_root, display_name, chat_session_id, sort_order, created_at, updated_at";

/// New projects are front-inserted: `sort_order = min(existing) - 1`, so the
/// most recently created project lists first until explicitly reordered.
pub fn create(
    conn: &Connection,
    user_id: &str,
    project_id: &str,
    workspace_root: &str,
    display_name: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Project> {
    let min_order: i64 = conn.query_row(
        "SELECT COALESCE(MIN(sort_order), 0) FROM projects WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO projects (user_id, project_id, workspace_root, display_name, chat_session_id, \
         sort_order, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?6)",
        params![user_id, project_id, workspace_root, display_name, min_order - 1, now_str],
    )?;
    get(conn, user_id, project_id)?.ok_or_else(|| crate::error::StorageError::NotFound(project_id.to_string()))
}

pub fn get(conn: &Connection, user_id: &str, project_id: &str) -> Result<Option<Project>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = ?1 AND project_id = ?2"),
            params![user_id, project_id],
            row_to_project,
        )
        .optional()?)
}

/// Ordered by `sort_order` ascending, per §8 S3.
pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = ?1 ORDER BY sort_order ASC"
    ))?;
    let rows = stmt
        .query_map(params![user_id], row_to_project)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn update(
    conn: &Connection,
    user_id: &str,
    project_id: &str,
    display_name: Option<&str>,
    chat_session_id: Option<&str>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE projects SET display_name = COALESCE(?3, display_name), \
         chat_session_id = COALESCE(?4, chat_session_id), updated_at = ?5 \
         WHERE user_id = ?1 AND project_id = ?2",
        params![user_id, project_id, display_name, chat_session_id, now.to_rfc3339()],
    )?;
    Ok(updated == 1)
}

pub fn delete(conn: &Connection, user_id: &str, project_id: &str) -> Result<bool> {
    let deleted =
        conn.execute("DELETE FROM projects WHERE user_id = ?1 AND project_id = ?2", params![user_id, project_id])?;
    Ok(deleted == 1)
}

/// Persist a new order for `ids` (first listed sorts first). Unknown ids are
/// ignored; ids belonging to other users are never touched, since the
/// `WHERE user_id = ?` predicate scopes every write.
pub fn reorder(conn: &Connection, user_id: &str, ids: &[String], now: chrono::DateTime<chrono::Utc>) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for (i, project_id) in ids.iter().enumerate() {
        tx.execute(
            "UPDATE projects SET sort_order = ?3, updated_at = ?4 WHERE user_id = ?1 AND project_id = ?2",
            params![user_id, project_id, i as i64, now.to_rfc3339()],
        )?;
    }
    tx.commit()?;
    Ok(())
}
