// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task Bundle Draft Store: backs `POST /api/task-bundle-drafts` and the
//! idempotent `POST /api/task-bundle-drafts/:id/approve` (spec.md §4.N, §8
//! S6). Not a §3 DATA MODEL entity on its own — it exists so the literally
//! required approve endpoint has something to approve.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::queries::tasks::{self, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftTaskInput {
    pub input: String,
    #[serde(default)]
    pub max_retries: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBundleDraft {
    pub id: String,
    pub draft_tasks: Vec<DraftTaskInput>,
    pub created_task_ids: Option<Vec<String>>,
    pub created_at: String,
    pub approved_at: Option<String>,
}

fn row_to_draft(r: &rusqlite::Row<'_>) -> rusqlite::Result<TaskBundleDraft> {
    let draft_tasks_json: String = r.get(1)?;
    let created_ids_json: Option<String> = r.get(2)?;
    Ok(TaskBundleDraft {
        id: r.get(0)?,
        draft_tasks: serde_json::from_str(&draft_tasks_json).unwrap_or_default(),
        created_task_ids: created_ids_json.and_then(|j| serde_json::from_str(&j).ok()),
        created_at: r.get(3)?,
        approved_at: r.get(4)?,
    })
}

const DRAFT_COLUMNS: &str = "id, draft_tasks, created_task_ids, created_at, approved_at";

pub fn create(
    conn: &Connection,
    id: &str,
    tasks: &[DraftTaskInput],
    now: chrono::DateTime<chrono::Utc>,
) -> Result<TaskBundleDraft> {
    let draft_tasks_json = serde_json::to_string(tasks).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO task_bundle_drafts (id, draft_tasks, created_task_ids, created_at, approved_at) \
         VALUES (?1, ?2, NULL, ?3, NULL)",
        params![id, draft_tasks_json, now.to_rfc3339()],
    )?;
    get(conn, id)?.ok_or_else(|| crate::error::StorageError::NotFound(id.to_string()))
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<TaskBundleDraft>> {
    Ok(conn
        .query_row(&format!("SELECT {DRAFT_COLUMNS} FROM task_bundle_drafts WHERE id = ?1"), params![id], row_to_draft)
        .optional()?)
}

/// Idempotent approval: the first call materializes each draft task as a
/// `Task` row and records `created_task_ids`; subsequent calls return the
/// same ids without creating anything new (spec.md §8 S6).
pub fn approve(
    conn: &Connection,
    draft_id: &str,
    workspace: &str,
    default_max_retries: i64,
    now: chrono::DateTime<chrono::Utc>,
    next_task_id: impl Fn() -> String,
) -> Result<Vec<String>> {
    let draft = get(conn, draft_id)?.ok_or_else(|| crate::error::StorageError::NotFound(draft_id.to_string()))?;
    if let Some(existing) = draft.created_task_ids {
        return Ok(existing);
    }

    let mut created_ids = Vec::with_capacity(draft.draft_tasks.len());
    for spec in &draft.draft_tasks {
        let id = next_task_id();
        tasks::create_task(
            conn,
            &id,
            workspace,
            &spec.input,
            now,
            TaskStatus::Queued,
            spec.max_retries.unwrap_or(default_max_retries),
        )?;
        created_ids.push(id);
    }

    let ids_json = serde_json::to_string(&created_ids).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE task_bundle_drafts SET created_task_ids = ?2, approved_at = ?3 WHERE id = ?1",
        params![draft_id, ids_json, now.to_rfc3339()],
    )?;
    Ok(created_ids)
}
