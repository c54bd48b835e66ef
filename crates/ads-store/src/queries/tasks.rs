// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task Store (spec.md §4.G): atomic task lifecycle operations backing the
//! Task Queue and Run Controller.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Planning,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Planning => "planning",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Planning | TaskStatus::Running)
    }

    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "pending" => TaskStatus::Pending,
            "queued" => TaskStatus::Queued,
            "planning" => TaskStatus::Planning,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" => TaskStatus::Cancelled,
            other => return Err(StorageError::NotFound(format!("unknown task status {other}"))),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workspace: String,
    pub status: TaskStatus,
    pub input: String,
    pub queue_order: i64,
    pub queued_at: Option<String>,
    pub prompt_injected_at: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub inherit_context: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub workspace: Option<String>,
    pub status: Option<TaskStatus>,
}

fn row_to_task(r: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = r.get(2)?;
    Ok(Task {
        id: r.get(0)?,
        workspace: r.get(1)?,
        status: TaskStatus::parse(&status_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "status".into(), rusqlite::types::Type::Text)
        })?,
        input: r.get(3)?,
        queue_order: r.get(4)?,
        queued_at: r.get(5)?,
        prompt_injected_at: r.get(6)?,
        retry_count: r.get(7)?,
        max_retries: r.get(8)?,
        inherit_context: r.get::<_, i64>(9)? != 0,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
    })
}

const TASK_COLUMNS: &str = "id, workspace, status, input, queue_order, queued_at, \
    prompt_injected_at, retry_count, max_retries, inherit_context, created_at, updated_at";

/// `createTask(input, now, {status})`: assigns `queue_order = now` by default.
pub fn create_task(
    conn: &Connection,
    id: &str,
    workspace: &str,
    input: &str,
    now: chrono::DateTime<chrono::Utc>,
    status: TaskStatus,
    max_retries: i64,
) -> Result<Task> {
    let now_str = now.to_rfc3339();
    let queue_order = now.timestamp_millis();
    conn.execute(
        "INSERT INTO tasks (id, workspace, status, input, queue_order, queued_at, \
         prompt_injected_at, retry_count, max_retries, inherit_context, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, 0, ?6, 0, ?7, ?7)",
        params![id, workspace, status.as_str(), input, queue_order, max_retries, now_str],
    )?;
    get_task(conn, id)?.ok_or_else(|| StorageError::NotFound(id.to_string()))
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    Ok(conn
        .query_row(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"), params![id], row_to_task)
        .optional()?)
}

/// `enqueue(task_id, now)`: `pending → queued`, sets `queued_at`, refreshes
/// `queue_order`.
pub fn enqueue(conn: &Connection, task_id: &str, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE tasks SET status = 'queued', queued_at = ?2, queue_order = ?3, updated_at = ?2 \
         WHERE id = ?1 AND status = 'pending'",
        params![task_id, now.to_rfc3339(), now.timestamp_millis()],
    )?;
    Ok(updated == 1)
}

/// `dequeueNextQueuedTask(now)`: selects the `queued` task with smallest
/// `queue_order` in a workspace with no active task, promotes it to
/// `pending`.
pub fn dequeue_next_queued_task(
    conn: &Connection,
    workspace: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Option<Task>> {
    let has_active: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tasks WHERE workspace = ?1 AND status IN ('planning','running'))",
        params![workspace],
        |r| r.get(0),
    )?;
    if has_active {
        return Ok(None);
    }

    let candidate: Option<String> = conn
        .query_row(
            "SELECT id FROM tasks WHERE workspace = ?1 AND status = 'queued' \
             ORDER BY queue_order ASC LIMIT 1",
            params![workspace],
            |r| r.get(0),
        )
        .optional()?;

    let Some(id) = candidate else { return Ok(None) };

    let updated = conn.execute(
        "UPDATE tasks SET status = 'pending', updated_at = ?2 WHERE id = ?1 AND status = 'queued'",
        params![id, now.to_rfc3339()],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    get_task(conn, &id)
}

/// `claimForExecution(now)`: `pending → planning` for exactly one task per
/// workspace, enforced by the `NOT EXISTS(active)` predicate. Returns `None`
/// on contention (another active task already exists, or no pending task).
pub fn claim_for_execution(
    conn: &Connection,
    workspace: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Option<Task>> {
    let candidate: Option<String> = conn
        .query_row(
            "SELECT id FROM tasks WHERE workspace = ?1 AND status = 'pending' \
             ORDER BY queue_order ASC LIMIT 1",
            params![workspace],
            |r| r.get(0),
        )
        .optional()?;
    let Some(id) = candidate else { return Ok(None) };

    let updated = conn.execute(
        "UPDATE tasks SET status = 'planning', updated_at = ?3 \
         WHERE id = ?1 AND status = 'pending' \
         AND NOT EXISTS (SELECT 1 FROM tasks WHERE workspace = ?2 AND status IN ('planning','running'))",
        params![id, workspace, now.to_rfc3339()],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    get_task(conn, &id)
}

/// `markPromptInjected(task_id, now)`: sets `prompt_injected_at` only if
/// null. Returns `true` iff it wrote.
pub fn mark_prompt_injected(
    conn: &Connection,
    task_id: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE tasks SET prompt_injected_at = ?2, updated_at = ?2 \
         WHERE id = ?1 AND prompt_injected_at IS NULL",
        params![task_id, now.to_rfc3339()],
    )?;
    Ok(updated == 1)
}

pub fn update_status(
    conn: &Connection,
    task_id: &str,
    status: TaskStatus,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![task_id, status.as_str(), now.to_rfc3339()],
    )?;
    Ok(())
}

pub fn add_message(
    conn: &Connection,
    task_id: &str,
    role: &str,
    text: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_messages (task_id, role, text, ts) VALUES (?1, ?2, ?3, ?4)",
        params![task_id, role, text, now.to_rfc3339()],
    )?;
    Ok(())
}

pub fn list_tasks(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut clauses = Vec::new();
    let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(ws) = &filter.workspace {
        clauses.push("workspace = ?");
        bind.push(Box::new(ws.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        bind.push(Box::new(status.as_str().to_string()));
    }
    let where_clause = if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks {where_clause} ORDER BY queue_order ASC");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|b| b.as_ref()).collect();
    let tasks = stmt
        .query_map(param_refs.as_slice(), row_to_task)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(tasks)
}

pub fn get_active_task_id(conn: &Connection, workspace: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM tasks WHERE workspace = ?1 AND status IN ('planning','running') LIMIT 1",
            params![workspace],
            |r| r.get(0),
        )
        .optional()?)
}

/// `retryFailed(task_id)`: increments `retry_count` if below `max_retries`;
/// returns the task to `pending` at the front of the queue
/// (`queue_order := min - 1`). Returns `false` if retries are exhausted.
pub fn retry_failed(conn: &Connection, task_id: &str, now: chrono::DateTime<chrono::Utc>) -> Result<bool> {
    let task = match get_task(conn, task_id)? {
        Some(t) => t,
        None => return Ok(false),
    };
    if task.retry_count >= task.max_retries {
        return Ok(false);
    }

    let min_order: i64 = conn.query_row(
        "SELECT COALESCE(MIN(queue_order), 0) FROM tasks WHERE workspace = ?1",
        params![task.workspace],
        |r| r.get(0),
    )?;

    conn.execute(
        "UPDATE tasks SET status = 'pending', retry_count = retry_count + 1, \
         queue_order = ?2, updated_at = ?3 WHERE id = ?1",
        params![task_id, min_order - 1, now.to_rfc3339()],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkspaceDb;

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    #[test]
    fn create_then_enqueue_then_dequeue_promotes_to_pending() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "do the thing", now(), TaskStatus::Pending, 3).unwrap();
        assert!(enqueue(db.conn(), "t1", now()).unwrap());
        let promoted = dequeue_next_queued_task(db.conn(), "ws1", now()).unwrap().unwrap();
        assert_eq!(promoted.id, "t1");
        assert_eq!(promoted.status, TaskStatus::Pending);
    }

    #[test]
    fn claim_for_execution_allows_only_one_active_task_per_workspace() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", now(), TaskStatus::Pending, 3).unwrap();
        create_task(db.conn(), "t2", "ws1", "b", now(), TaskStatus::Pending, 3).unwrap();

        let claimed1 = claim_for_execution(db.conn(), "ws1", now()).unwrap();
        assert!(claimed1.is_some());
        assert_eq!(claimed1.unwrap().status, TaskStatus::Planning);

        // t2 is still pending but can't be claimed while t1 is active.
        let claimed2 = claim_for_execution(db.conn(), "ws1", now()).unwrap();
        assert!(claimed2.is_none());
    }

    #[test]
    fn mark_prompt_injected_is_write_once() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", now(), TaskStatus::Pending, 3).unwrap();
        assert!(mark_prompt_injected(db.conn(), "t1", now()).unwrap());
        assert!(!mark_prompt_injected(db.conn(), "t1", now()).unwrap());
    }

    #[test]
    fn retry_failed_returns_task_to_front_of_queue() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", now(), TaskStatus::Pending, 3).unwrap();
        create_task(db.conn(), "t2", "ws1", "b", now(), TaskStatus::Pending, 3).unwrap();
        update_status(db.conn(), "t1", TaskStatus::Failed, now()).unwrap();

        assert!(retry_failed(db.conn(), "t1", now()).unwrap());
        let t1 = get_task(db.conn(), "t1").unwrap().unwrap();
        let t2 = get_task(db.conn(), "t2").unwrap().unwrap();
        assert_eq!(t1.status, TaskStatus::Pending);
        assert_eq!(t1.retry_count, 1);
        assert!(t1.queue_order < t2.queue_order);
    }

    #[test]
    fn retry_failed_exhausted_returns_false() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", now(), TaskStatus::Pending, 0).unwrap();
        update_status(db.conn(), "t1", TaskStatus::Failed, now()).unwrap();
        assert!(!retry_failed(db.conn(), "t1", now()).unwrap());
    }

    #[test]
    fn get_active_task_id_reflects_planning_or_running() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", now(), TaskStatus::Pending, 3).unwrap();
        assert!(get_active_task_id(db.conn(), "ws1").unwrap().is_none());
        claim_for_execution(db.conn(), "ws1", now()).unwrap();
        assert_eq!(get_active_task_id(db.conn(), "ws1").unwrap(), Some("t1".to_string()));
    }

    #[test]
    fn list_tasks_filters_by_workspace_and_status() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        create_task(db.conn(), "t1", "ws1", "a", now(), TaskStatus::Pending, 3).unwrap();
        create_task(db.conn(), "t2", "ws2", "b", now(), TaskStatus::Pending, 3).unwrap();
        let filtered = list_tasks(
            db.conn(),
            &TaskFilter { workspace: Some("ws1".into()), status: Some(TaskStatus::Pending) },
        )
        .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "t1");
    }
}
