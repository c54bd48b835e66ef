// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Run Controller (spec.md §4.I): arbitrates the three queue-drain modes
//! (`manual`, `all`, `single`) and the single-task-run request flow.

use std::sync::Arc;

use rusqlite::params;
use tokio::sync::Mutex as AsyncMutex;

use crate::db::WorkspaceDb;
use crate::queries::tasks::{self, TaskStatus};
use crate::queue::{QueueState, TaskQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Manual,
    All,
    Single,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunRequestOutcome {
    /// 202: the requested task is already the active one.
    AlreadyActive,
    /// The task was (re)armed for a single run.
    Started,
}

#[derive(Debug, thiserror::Error)]
pub enum RunControllerError {
    #[error("task not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] crate::error::StorageError),
}

pub struct RunController {
    workspace: String,
    db: Arc<AsyncMutex<WorkspaceDb>>,
    queue: Arc<TaskQueue>,
    mode: AsyncMutex<RunMode>,
    single_task_id: AsyncMutex<Option<String>>,
}

impl RunController {
    pub fn new(workspace: impl Into<String>, db: Arc<AsyncMutex<WorkspaceDb>>, queue: Arc<TaskQueue>) -> Self {
        Self {
            workspace: workspace.into(),
            db,
            queue,
            mode: AsyncMutex::new(RunMode::Manual),
            single_task_id: AsyncMutex::new(None),
        }
    }

    pub async fn mode(&self) -> RunMode {
        *self.mode.lock().await
    }

    /// Queue allowed to drain: promotions of queued tasks resume.
    pub async fn set_mode_all(&self) {
        *self.mode.lock().await = RunMode::All;
        *self.single_task_id.lock().await = None;
        self.queue.start().await;
    }

    /// Queue paused; no promotions occur.
    pub async fn set_mode_manual(&self) {
        *self.mode.lock().await = RunMode::Manual;
        *self.single_task_id.lock().await = None;
        self.queue.pause().await;
    }

    pub async fn request_single_task_run(
        &self,
        task_id: &str,
    ) -> Result<RunRequestOutcome, RunControllerError> {
        let task = {
            let db = self.db.lock().await;
            tasks::get_task(db.conn(), task_id)?.ok_or(RunControllerError::NotFound)?
        };

        let mode = *self.mode.lock().await;
        if mode == RunMode::All && self.queue.state().await == QueueState::Running {
            return Err(RunControllerError::Conflict("queue is running in all mode".into()));
        }

        let active_id = {
            let db = self.db.lock().await;
            tasks::get_active_task_id(db.conn(), &self.workspace)?
        };
        if let Some(active) = &active_id {
            if active == task_id {
                return Ok(RunRequestOutcome::AlreadyActive);
            }
            return Err(RunControllerError::Conflict("another task is active".into()));
        }

        if task.status.is_terminal() {
            return Err(RunControllerError::Conflict("task status is terminal".into()));
        }

        {
            let db = self.db.lock().await;
            let conn = db.conn();
            let min_order: i64 = conn
                .query_row(
                    "SELECT COALESCE(MIN(queue_order), 0) FROM tasks WHERE workspace = ?1",
                    params![self.workspace],
                    |r| r.get(0),
                )
                .map_err(crate::error::StorageError::from)?;
            let now = chrono::Utc::now();
            conn.execute(
                "UPDATE tasks SET queue_order = ?2, updated_at = ?3 WHERE id = ?1",
                params![task_id, min_order - 1, now.to_rfc3339()],
            )
            .map_err(crate::error::StorageError::from)?;
            if task.status == TaskStatus::Queued {
                tasks::update_status(conn, task_id, TaskStatus::Pending, now)?;
            }
            tasks::add_message(
                conn,
                task_id,
                "status",
                "single-task run requested by operator",
                now,
            )?;
        }

        *self.mode.lock().await = RunMode::Single;
        *self.single_task_id.lock().await = Some(task_id.to_string());
        self.queue.start().await;
        self.queue.notify_new_task();

        Ok(RunRequestOutcome::Started)
    }

    /// Called when a task reaches a terminal state. Returns `true` if this
    /// was the single-mode task, in which case the queue reverts to
    /// `manual` and pauses.
    pub async fn on_task_terminal(&self, task_id: &str) -> bool {
        let mode = *self.mode.lock().await;
        let single = self.single_task_id.lock().await.clone();
        if mode == RunMode::Single && single.as_deref() == Some(task_id) {
            self.queue.pause().await;
            *self.mode.lock().await = RunMode::Manual;
            *self.single_task_id.lock().await = None;
            true
        } else {
            false
        }
    }

    /// `false` while in `single` mode for this task id — other queued tasks
    /// must not be promoted when it terminates.
    pub async fn should_promote_queued_tasks_on_terminal(&self, task_id: &str) -> bool {
        let mode = *self.mode.lock().await;
        let single = self.single_task_id.lock().await.clone();
        !(mode == RunMode::Single && single.as_deref() == Some(task_id))
    }
}
