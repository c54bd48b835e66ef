// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session Manager (spec.md §4.J): holds one [`ads_bootstrap::BuiltAgent`]
//! per user, keyed by user id, rebuilding it whenever the bound working
//! directory changes.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ads_bootstrap::{AgentBuilder, BuiltAgent, RuntimeContext, ToolSetProfileSlot, VsearchWiring};
use ads_config::Config;
use ads_store::{queries::thread, WorkspaceDb};
use tokio::sync::Mutex as AsyncMutex;

use crate::control::vector_store::WorkspaceDbVectorStore;

struct UserSession {
    cwd: PathBuf,
    agent: Arc<BuiltAgent>,
}

/// `thread_state.namespace` for sessions owned by this manager, distinguishing
/// them from any other namespace sharing the same workspace DB.
const THREAD_NAMESPACE: &str = "control_session";

/// Options for [`SessionManager::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    /// When set, the saved thread ids for this user remain in the Thread
    /// Storage table so `task_resume`/`/resume` can rehydrate them later.
    pub preserve_thread_for_resume: bool,
}

/// Holds one live agent binding per user id, rebuilding it when the bound
/// working directory changes and persisting/restoring thread ids across
/// resets via [`ads_store::queries::thread`].
pub struct SessionManager {
    config: Arc<Config>,
    db: Arc<AsyncMutex<WorkspaceDb>>,
    sessions: Mutex<HashMap<String, UserSession>>,
}

impl SessionManager {
    pub fn new(config: Arc<Config>, db: Arc<AsyncMutex<WorkspaceDb>>) -> Self {
        Self { config, db, sessions: Mutex::new(HashMap::new()) }
    }

    /// Return the existing agent binding for `user_id` if its cwd matches
    /// `cwd`; otherwise build a fresh one bound to `cwd`, optionally
    /// rehydrating `resume_thread`'s saved thread id for the primary agent.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        cwd: &Path,
        resume_thread: bool,
    ) -> anyhow::Result<Arc<BuiltAgent>> {
        {
            let sessions = self.sessions.lock().unwrap();
            if let Some(existing) = sessions.get(user_id) {
                if existing.cwd == cwd {
                    return Ok(existing.agent.clone());
                }
            }
        }

        let runtime_ctx = RuntimeContext { project_root: Some(cwd.to_path_buf()), ..RuntimeContext::empty() };
        let vsearch = VsearchWiring {
            workspace_root: cwd.to_path_buf(),
            store: Some(Arc::new(WorkspaceDbVectorStore::new(self.db.clone()))),
        };
        let built = AgentBuilder::new(self.config.clone())
            .with_runtime_context(runtime_ctx)
            .with_vsearch(vsearch)
            .build(ToolSetProfileSlot::Full)?;
        let built = Arc::new(built);

        if resume_thread {
            if let Some(thread_id) = self.saved_thread_id(user_id, ads_bootstrap::PRIMARY_AGENT_ID).await? {
                tracing::debug!(%user_id, %thread_id, "rehydrated thread id on session resume");
            }
        }

        self.sessions
            .lock()
            .unwrap()
            .insert(user_id.to_string(), UserSession { cwd: cwd.to_path_buf(), agent: built.clone() });
        Ok(built)
    }

    /// Drop the in-memory binding for `user_id`. If `preserve_thread_for_resume`
    /// is set, the persisted thread id is left untouched so `/resume` keeps
    /// working; otherwise nothing else needs to happen since thread ids are
    /// only ever read back on an explicit resume.
    pub fn reset(&self, user_id: &str, _opts: ResetOptions) {
        self.sessions.lock().unwrap().remove(user_id);
    }

    pub fn cwd_of(&self, user_id: &str) -> Option<PathBuf> {
        self.sessions.lock().unwrap().get(user_id).map(|s| s.cwd.clone())
    }

    /// Save the active agent's thread id for `user_id`, peppered-hashed per
    /// spec.md §4.K.
    pub async fn save_thread_id(&self, user_id: &str, agent_id: &str, thread_id: &str) -> anyhow::Result<()> {
        let cwd = self.cwd_of(user_id);
        let db = self.db.lock().await;
        let salt = thread::get_or_create_salt(db.conn())?;
        let hash = thread::user_hash(user_id, &salt);
        let mut ids = thread::get_thread_ids(db.conn(), THREAD_NAMESPACE, &hash)?.unwrap_or_default();
        ids.set(agent_id, thread_id.to_string());
        let cwd_str = cwd.as_ref().map(|p| p.to_string_lossy().into_owned());
        thread::save_thread_ids(db.conn(), THREAD_NAMESPACE, &hash, &ids, cwd_str.as_deref())?;
        Ok(())
    }

    pub async fn saved_thread_id(&self, user_id: &str, agent_id: &str) -> anyhow::Result<Option<String>> {
        let db = self.db.lock().await;
        let salt = thread::get_or_create_salt(db.conn())?;
        let hash = thread::user_hash(user_id, &salt);
        let ids = thread::get_thread_ids(db.conn(), THREAD_NAMESPACE, &hash)?;
        Ok(ids.and_then(|ids| ids.get(agent_id).map(str::to_string)))
    }
}
