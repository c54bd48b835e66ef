// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Task Queue (spec.md §4.H): per-workspace worker loop driving the Task
//! Store's claim/retry state machine, plus the Run Controller (§4.I) that
//! arbitrates `manual`/`all`/`single` execution modes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex as AsyncMutex, Notify};
use tracing::{info, warn};

use crate::db::WorkspaceDb;
use crate::error::Result;
use crate::lock_pool::WorkspaceLockPool;
use crate::queries::task_contexts::{self, ARTIFACT_CHANGED_PATHS, ARTIFACT_WORKSPACE_PATCH};
use crate::queries::tasks::{self, Task, TaskStatus};

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Events emitted by a running queue, named exactly as spec.md §4.H lists
/// them so transport layers (WebSocket/HTTP) can forward them verbatim.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    TaskStarted { task_id: String },
    TaskRunning { task_id: String },
    Message { task_id: String, role: String, text: String },
    MessageDelta { task_id: String, delta: String },
    Command { task_id: String, text: String },
    TaskCompleted { task_id: String },
    TaskFailed { task_id: String, reason: String },
    TaskCancelled { task_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Stopped,
    Running,
    Paused,
}

/// What happened while a task ran. `Aborted` never counts against
/// `retry_count` (maps to the host `AbortError` kind); `Failed` does.
#[derive(Debug)]
pub enum TaskRunOutcome {
    Completed,
    Aborted,
    Failed(String),
}

/// Runs one task to completion. Implemented by the hosting crate (`ads-node`)
/// over `ads_hub::AgentHub`, keeping this crate free of an `ads-hub`
/// dependency — the same bridge pattern as `ads_tools::AgentInvoker`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run_task(&self, task: &Task, events: broadcast::Sender<QueueEvent>) -> TaskRunOutcome;
}

pub struct TaskQueue {
    workspace: String,
    workspace_root: PathBuf,
    db: Arc<AsyncMutex<WorkspaceDb>>,
    lock_pool: Arc<WorkspaceLockPool>,
    executor: Arc<dyn TaskExecutor>,
    state: Arc<AsyncMutex<QueueState>>,
    notify: Arc<Notify>,
    events: broadcast::Sender<QueueEvent>,
    retry_backoff_ms: u64,
    poll_interval_ms: u64,
}

impl TaskQueue {
    pub fn new(
        workspace: impl Into<String>,
        workspace_root: PathBuf,
        db: Arc<AsyncMutex<WorkspaceDb>>,
        lock_pool: Arc<WorkspaceLockPool>,
        executor: Arc<dyn TaskExecutor>,
        retry_backoff_ms: u64,
    ) -> (Self, broadcast::Receiver<QueueEvent>) {
        let (events, rx) = broadcast::channel(1024);
        let queue = Self {
            workspace: workspace.into(),
            workspace_root,
            db,
            lock_pool,
            executor,
            state: Arc::new(AsyncMutex::new(QueueState::Stopped)),
            notify: Arc::new(Notify::new()),
            events,
            retry_backoff_ms,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        };
        (queue, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn notify_new_task(&self) {
        self.notify.notify_one();
    }

    pub async fn start(&self) {
        *self.state.lock().await = QueueState::Running;
        self.notify.notify_one();
    }

    pub async fn pause(&self) {
        *self.state.lock().await = QueueState::Paused;
    }

    pub async fn stop(&self) {
        *self.state.lock().await = QueueState::Stopped;
    }

    pub async fn state(&self) -> QueueState {
        *self.state.lock().await
    }

    /// Spawn the worker loop. Returns a handle the caller can abort on
    /// shutdown.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self: Arc<Self>) {
        info!(workspace = %self.workspace, "task queue worker started");
        loop {
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(self.poll_interval_ms)) => {}
            }

            if *self.state.lock().await != QueueState::Running {
                continue;
            }

            if let Err(e) = self.step_once().await {
                warn!(workspace = %self.workspace, error = %e, "task queue step failed");
            }
        }
    }

    /// One iteration of the worker loop (spec.md §4.H steps 2-8), runnable
    /// in isolation by tests and by [`run`].
    pub async fn step_once(self: &Arc<Self>) -> Result<()> {
        let _guard = self.lock_pool.acquire(&self.workspace_root).await;

        let claimed = {
            let db = self.db.lock().await;
            let now = chrono::Utc::now();
            tasks::dequeue_next_queued_task(db.conn(), &self.workspace, now)?;
            tasks::claim_for_execution(db.conn(), &self.workspace, now)?
        };

        let Some(task) = claimed else { return Ok(()) };

        let _ = self.events.send(QueueEvent::TaskStarted { task_id: task.id.clone() });
        {
            let db = self.db.lock().await;
            tasks::update_status(db.conn(), &task.id, TaskStatus::Running, chrono::Utc::now())?;
        }
        let _ = self.events.send(QueueEvent::TaskRunning { task_id: task.id.clone() });

        let outcome = self.executor.run_task(&task, self.events.clone()).await;

        match outcome {
            TaskRunOutcome::Completed => {
                self.record_artifacts(&task.id).await?;
                let db = self.db.lock().await;
                tasks::update_status(db.conn(), &task.id, TaskStatus::Completed, chrono::Utc::now())?;
                let _ = self.events.send(QueueEvent::TaskCompleted { task_id: task.id.clone() });
            }
            TaskRunOutcome::Aborted => {
                let db = self.db.lock().await;
                tasks::update_status(db.conn(), &task.id, TaskStatus::Cancelled, chrono::Utc::now())?;
                let _ = self.events.send(QueueEvent::TaskCancelled { task_id: task.id.clone() });
            }
            TaskRunOutcome::Failed(reason) => {
                let retried = {
                    let db = self.db.lock().await;
                    tasks::retry_failed(db.conn(), &task.id, chrono::Utc::now())?
                };
                if retried {
                    let retry_count = {
                        let db = self.db.lock().await;
                        tasks::get_task(db.conn(), &task.id)?.map(|t| t.retry_count).unwrap_or(1)
                    };
                    let backoff = self.retry_backoff_ms * retry_count.max(1) as u64;
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                    self.notify.notify_one();
                } else {
                    let db = self.db.lock().await;
                    tasks::update_status(db.conn(), &task.id, TaskStatus::Failed, chrono::Utc::now())?;
                    let _ = self.events.send(QueueEvent::TaskFailed { task_id: task.id.clone(), reason });
                }
            }
        }
        Ok(())
    }

    /// Write-once post-processing for a completed task (spec.md §3/§4.H):
    /// records the `artifact:changed_paths` and `artifact:workspace_patch`
    /// `TaskContext` rows by shelling out to `git`, scoped to the workspace
    /// root. Falls back to a reason string when `git` is unavailable or the
    /// workspace isn't a repo, rather than leaving the artifact unrecorded.
    async fn record_artifacts(&self, task_id: &str) -> Result<()> {
        let changed_paths = self.git_changed_paths().await;
        let patch = self.git_workspace_patch().await;

        let db = self.db.lock().await;
        let now = chrono::Utc::now();
        task_contexts::record_once(db.conn(), task_id, ARTIFACT_CHANGED_PATHS, &changed_paths, now)?;
        task_contexts::record_once(db.conn(), task_id, ARTIFACT_WORKSPACE_PATCH, &patch, now)?;
        Ok(())
    }

    async fn git_changed_paths(&self) -> String {
        match tokio::process::Command::new("git")
            .arg("status")
            .arg("--porcelain")
            .current_dir(&self.workspace_root)
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if text.is_empty() { "no_changed_paths_recorded".to_string() } else { text }
            }
            _ => "no_changed_paths_recorded".to_string(),
        }
    }

    async fn git_workspace_patch(&self) -> String {
        match tokio::process::Command::new("git").arg("diff").current_dir(&self.workspace_root).output().await {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if text.is_empty() { "patch_not_available".to_string() } else { text }
            }
            _ => "patch_not_available".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysCompletes;

    #[async_trait]
    impl TaskExecutor for AlwaysCompletes {
        async fn run_task(&self, _task: &Task, _events: broadcast::Sender<QueueEvent>) -> TaskRunOutcome {
            TaskRunOutcome::Completed
        }
    }

    struct AlwaysFails(Arc<AtomicUsize>);

    #[async_trait]
    impl TaskExecutor for AlwaysFails {
        async fn run_task(&self, _task: &Task, _events: broadcast::Sender<QueueEvent>) -> TaskRunOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            TaskRunOutcome::Failed("boom".into())
        }
    }

    fn setup(executor: Arc<dyn TaskExecutor>) -> (Arc<TaskQueue>, Arc<AsyncMutex<WorkspaceDb>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(AsyncMutex::new(WorkspaceDb::open_in_memory().unwrap()));
        let lock_pool = Arc::new(WorkspaceLockPool::new());
        let (queue, _rx) = TaskQueue::new("ws1", dir.path().to_path_buf(), db.clone(), lock_pool, executor, 1);
        (Arc::new(queue), db, dir)
    }

    #[tokio::test]
    async fn step_once_does_nothing_when_no_task_is_pending() {
        let (queue, _db, _dir) = setup(Arc::new(AlwaysCompletes));
        queue.step_once().await.unwrap();
    }

    #[tokio::test]
    async fn step_once_runs_a_queued_task_to_completion() {
        let (queue, db, _dir) = setup(Arc::new(AlwaysCompletes));
        {
            let conn = db.lock().await;
            tasks::create_task(conn.conn(), "t1", "ws1", "do it", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
        }
        queue.step_once().await.unwrap();
        let conn = db.lock().await;
        let task = tasks::get_task(conn.conn(), "t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn step_once_retries_a_failed_task_with_backoff() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (queue, db, _dir) = setup(Arc::new(AlwaysFails(attempts.clone())));
        {
            let conn = db.lock().await;
            tasks::create_task(conn.conn(), "t1", "ws1", "do it", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
        }
        queue.step_once().await.unwrap();
        let conn = db.lock().await;
        let task = tasks::get_task(conn.conn(), "t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending, "retried task returns to pending");
        assert_eq!(task.retry_count, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn step_once_marks_task_failed_once_retries_are_exhausted() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (queue, db, _dir) = setup(Arc::new(AlwaysFails(attempts.clone())));
        {
            let conn = db.lock().await;
            tasks::create_task(conn.conn(), "t1", "ws1", "do it", chrono::Utc::now(), TaskStatus::Pending, 0).unwrap();
        }
        queue.step_once().await.unwrap();
        let conn = db.lock().await;
        let task = tasks::get_task(conn.conn(), "t1").unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn completed_task_records_artifact_context_with_fallback_outside_a_git_repo() {
        let (queue, db, _dir) = setup(Arc::new(AlwaysCompletes));
        {
            let conn = db.lock().await;
            tasks::create_task(conn.conn(), "t1", "ws1", "do it", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
        }
        queue.step_once().await.unwrap();
        let conn = db.lock().await;
        let changed = task_contexts::get(conn.conn(), "t1", ARTIFACT_CHANGED_PATHS).unwrap().unwrap();
        let patch = task_contexts::get(conn.conn(), "t1", ARTIFACT_WORKSPACE_PATCH).unwrap().unwrap();
        assert_eq!(changed.content, "no_changed_paths_recorded");
        assert_eq!(patch.content, "patch_not_available");
    }

    #[tokio::test]
    async fn at_most_one_active_task_per_workspace_even_with_two_pending() {
        let (queue, db, _dir) = setup(Arc::new(AlwaysCompletes));
        {
            let conn = db.lock().await;
            tasks::create_task(conn.conn(), "t1", "ws1", "a", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
            tasks::create_task(conn.conn(), "t2", "ws1", "b", chrono::Utc::now(), TaskStatus::Pending, 3).unwrap();
        }
        queue.step_once().await.unwrap();
        let conn = db.lock().await;
        let active = tasks::list_tasks(
            conn.conn(),
            &tasks::TaskFilter { workspace: Some("ws1".into()), status: None },
        )
        .unwrap();
        let active_count = active.iter().filter(|t| t.status.is_active()).count();
        assert!(active_count <= 1);
    }
}
