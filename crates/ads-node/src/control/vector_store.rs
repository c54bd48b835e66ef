// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bridges [`ads_tools::VectorIndexStore`] (the Vector Auto-Context
//! indexer/query hook) to the workspace database's `history`/`vector_kv`
//! tables, without `ads-tools` depending on `ads-store` directly — the same
//! shape as [`ads_bootstrap::agent::OrchestratorInvoker`] bridging
//! `AgentInvoker` to the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use ads_store::queries::{history, vector_kv};
use ads_store::WorkspaceDb;
use ads_tools::{HistoryRow, VectorIndexStore};

const DOCS_NAMESPACE: &str = "docs";
const HISTORY_NAMESPACE: &str = "history";

pub struct WorkspaceDbVectorStore {
    db: Arc<AsyncMutex<WorkspaceDb>>,
}

impl WorkspaceDbVectorStore {
    pub fn new(db: Arc<AsyncMutex<WorkspaceDb>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorIndexStore for WorkspaceDbVectorStore {
    async fn indexed_content_hash(&self, key: &str) -> Option<String> {
        let db = self.db.lock().await;
        vector_kv::get(db.conn(), DOCS_NAMESPACE, key).ok()?.and_then(|e| e.content_hash)
    }

    async fn mark_indexed(&self, key: &str, content_hash: &str) {
        let db = self.db.lock().await;
        let _ = vector_kv::upsert_content_hash(db.conn(), DOCS_NAMESPACE, key, content_hash);
    }

    async fn history_cursor(&self, session_id: &str) -> i64 {
        let db = self.db.lock().await;
        vector_kv::get(db.conn(), HISTORY_NAMESPACE, session_id).ok().flatten().map(|e| e.last_id).unwrap_or(0)
    }

    async fn advance_history_cursor(&self, session_id: &str, last_id: i64) {
        let db = self.db.lock().await;
        let _ = vector_kv::advance_cursor(db.conn(), HISTORY_NAMESPACE, session_id, last_id);
    }

    async fn history_sessions(&self) -> Vec<String> {
        let db = self.db.lock().await;
        history::list_session_ids(db.conn()).unwrap_or_default()
    }

    async fn history_rows_after(&self, session_id: &str, after_id: i64) -> Vec<HistoryRow> {
        let db = self.db.lock().await;
        history::get_after(db.conn(), session_id, after_id)
            .unwrap_or_default()
            .into_iter()
            .map(|e| HistoryRow { id: e.id, role: e.role, text: e.text })
            .collect()
    }

    async fn last_meaningful_user_message(&self, session_id: &str) -> Option<String> {
        let db = self.db.lock().await;
        history::last_user_message(db.conn(), session_id).ok().flatten()
    }
}
