// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task Context Store (spec.md §3/§4.H): write-once-per-`(task_id,
//! context_type)` artifacts. Terminal-event post-processing records two of
//! these per task: `artifact:changed_paths` and `artifact:workspace_patch`.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ARTIFACT_CHANGED_PATHS: &str = "artifact:changed_paths";
pub const ARTIFACT_WORKSPACE_PATCH: &str = "artifact:workspace_patch";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: String,
    pub context_type: String,
    pub content: String,
    pub created_at: String,
}

/// Insert `(task_id, context_type)` iff it doesn't already exist. Returns
/// `true` iff it wrote — mirrors `mark_prompt_injected`'s write-once shape.
pub fn record_once(
    conn: &Connection,
    task_id: &str,
    context_type: &str,
    content: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<bool> {
    let written = conn.execute(
        "INSERT INTO task_contexts (task_id, context_type, content, created_at) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(task_id, context_type) DO NOTHING",
        params![task_id, context_type, content, now.to_rfc3339()],
    )?;
    Ok(written == 1)
}

pub fn get(conn: &Connection, task_id: &str, context_type: &str) -> Result<Option<TaskContext>> {
    Ok(conn
        .query_row(
            "SELECT task_id, context_type, content, created_at FROM task_contexts \
             WHERE task_id = ?1 AND context_type = ?2",
            params![task_id, context_type],
            |r| {
                Ok(TaskContext { task_id: r.get(0)?, context_type: r.get(1)?, content: r.get(2)?, created_at: r.get(3)? })
            },
        )
        .optional()?)
}

pub fn list_for_task(conn: &Connection, task_id: &str) -> Result<Vec<TaskContext>> {
    let mut stmt = conn.prepare(
        "SELECT task_id, context_type, content, created_at FROM task_contexts WHERE task_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt
        .query_map(params![task_id], |r| {
            Ok(TaskContext { task_id: r.get(0)?, context_type: r.get(1)?, content: r.get(2)?, created_at: r.get(3)? })
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tasks::{create_task, TaskStatus};
    use crate::WorkspaceDb;

    #[test]
    fn record_once_is_write_once_per_type() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
        assert!(record_once(db.conn(), "t1", ARTIFACT_CHANGED_PATHS, "a.rs\nb.rs", chrono::Utc::now()).unwrap());
        assert!(!record_once(db.conn(), "t1", ARTIFACT_CHANGED_PATHS, "overwrite attempt", chrono::Utc::now()).unwrap());
        let stored = get(db.conn(), "t1", ARTIFACT_CHANGED_PATHS).unwrap().unwrap();
        assert_eq!(stored.content, "a.rs\nb.rs");
    }

    #[test]
    fn distinct_context_types_are_independent() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
        record_once(db.conn(), "t1", ARTIFACT_CHANGED_PATHS, "a.rs", chrono::Utc::now()).unwrap();
        record_once(db.conn(), "t1", ARTIFACT_WORKSPACE_PATCH, "diff --git a/a.rs", chrono::Utc::now()).unwrap();
        assert_eq!(list_for_task(db.conn(), "t1").unwrap().len(), 2);
    }
}
