// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Node startup — assembles all subsystems and starts them.
//!
//! # Startup sequence
//!
//! [`Node::run`] performs these steps in order:
//!
//! 1. Open the workspace database (`.ads/state.db`), creating it if absent.
//! 2. Load admin credentials, if a credentials file is configured.
//! 3. Build the Session Manager, Workspace Lock Pool, Task Queue, and Run
//!    Controller.
//! 4. Spawn the Task Queue worker loop.
//! 5. Start the Axum HTTP/WebSocket server (blocks until shutdown).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use ads_config::Config;
use ads_store::{GlobalDb, TaskQueue, WorkspaceDb, WorkspaceLockPool};

use crate::config::NodeConfig;
use crate::control::session::SessionManager;
use crate::crypto::CredentialsFile;
use crate::http::AppState;

mod executor;

pub use executor::HubTaskExecutor;

/// `~/.ads/state.db`, or `ADS_STATE_DB_PATH` if set (spec.md §6 global path).
fn global_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("ADS_STATE_DB_PATH") {
        return PathBuf::from(path);
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".ads").join("state.db")
}

/// A running node: the assembled state needed to serve the WebSocket front
/// and HTTP API for one workspace.
pub struct Node {
    config: NodeConfig,
    workspace_root: PathBuf,
    state: AppState,
    queue: Arc<TaskQueue>,
}

impl Node {
    /// Assemble a node bound to `workspace_root`, opening (or creating) its
    /// `.ads/state.db` and wiring the Session Manager, Task Queue, and Run
    /// Controller around it.
    pub async fn build(
        config: NodeConfig,
        agent_config: Arc<Config>,
        workspace_root: PathBuf,
    ) -> anyhow::Result<Self> {
        let db_path = workspace_root.join(".ads").join("state.db");
        let db = Arc::new(AsyncMutex::new(WorkspaceDb::open(&db_path)?));

        let global_db_path = global_db_path();
        let global_db = Arc::new(AsyncMutex::new(GlobalDb::open(&global_db_path)?));

        let credentials = match &config.auth.credentials_file {
            Some(path) if CredentialsFile::exists(path) => Some(CredentialsFile::load(path)?),
            Some(path) => {
                tracing::warn!(path = %path.display(), "configured credentials file does not exist; login is disabled until `ads init-admin` runs");
                None
            }
            None => None,
        };

        let sessions = Arc::new(SessionManager::new(agent_config.clone(), db.clone()));
        let locks = Arc::new(WorkspaceLockPool::new());

        let workspace_key = workspace_root.display().to_string();
        let executor = Arc::new(HubTaskExecutor::new(sessions.clone(), workspace_root.clone()));
        let (queue, _events_rx) = TaskQueue::new(
            workspace_key.clone(),
            workspace_root.clone(),
            db.clone(),
            locks.clone(),
            executor,
            agent_config.queue.retry_backoff_ms,
        );
        let queue = Arc::new(queue);

        let run_controller = Arc::new(ads_store::RunController::new(workspace_key, db.clone(), queue.clone()));

        let state = AppState::new(
            Arc::new(config.clone()),
            agent_config,
            credentials,
            sessions,
            db,
            global_db,
            locks,
            run_controller,
            queue.clone(),
            workspace_root.clone(),
        );

        Ok(Self { config, workspace_root, state, queue })
    }

    /// Start the Task Queue worker loop and the HTTP/WebSocket server.
    /// Blocks until the server shuts down.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(workspace = %self.workspace_root.display(), "starting task queue worker");
        let _queue_handle = self.queue.clone().spawn();

        info!(
            bind = %self.config.http.bind,
            tls = !self.config.http.insecure_dev_mode,
            "starting node HTTP/WebSocket server",
        );
        crate::http::serve(&self.config.http, self.state).await
    }
}
