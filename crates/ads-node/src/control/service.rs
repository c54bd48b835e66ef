// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`ControlService`] drives one user's prompts/commands through the
//! Session Manager and the active agent's hub, appending every turn to the
//! History Store and bridging [`HubEvent`]s into [`ServerMessage`]s for the
//! WebSocket front.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ads_core::IntoErrorKind as _;
use ads_hub::{HubEvent, TurnOptions};
use ads_store::{queries::history, WorkspaceDb, WorkspaceLockPool};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::control::protocol::{ClientMessage, CommandPayload, ServerMessage};
use crate::control::session::{ResetOptions, SessionManager};
use crate::error::{NodeError, NodeResult};

/// One connected WebSocket client's handle onto [`ControlService`].
///
/// Holds the cancellation token for whatever turn this connection's user
/// currently has in flight, so `ClientMessage::Interrupt` can abort it.
pub struct AgentHandle {
    pub user_id: String,
    cancel: AsyncMutex<Option<CancellationToken>>,
}

impl AgentHandle {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), cancel: AsyncMutex::new(None) }
    }

    async fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());
        token
    }

    async fn end_turn(&self) {
        *self.cancel.lock().await = None;
    }

    async fn interrupt(&self) {
        if let Some(token) = self.cancel.lock().await.as_ref() {
            token.cancel();
        }
    }
}

/// Drives turns for every connected client of one workspace.
pub struct ControlService {
    sessions: Arc<SessionManager>,
    db: Arc<AsyncMutex<WorkspaceDb>>,
    locks: Arc<WorkspaceLockPool>,
    workspace_root: PathBuf,
    max_history_entries: usize,
    max_history_text_length: usize,
}

impl ControlService {
    pub fn new(
        sessions: Arc<SessionManager>,
        db: Arc<AsyncMutex<WorkspaceDb>>,
        locks: Arc<WorkspaceLockPool>,
        workspace_root: PathBuf,
    ) -> Self {
        Self { sessions, db, locks, workspace_root, max_history_entries: 500, max_history_text_length: 32_000 }
    }

    /// Handle one [`ClientMessage`] for `user_id`, streaming [`ServerMessage`]s
    /// to `out` as the turn progresses. Returns once the message has been
    /// fully handled — for `Prompt`/`Command`/`TaskResume` that means the
    /// agent turn has finished or been interrupted.
    pub async fn handle(
        &self,
        handle: &AgentHandle,
        cwd: &Path,
        msg: ClientMessage,
        out: &mpsc::Sender<ServerMessage>,
    ) -> NodeResult<()> {
        match msg {
            ClientMessage::Ping => {
                let ts = chrono::Utc::now().timestamp_millis();
                let _ = out.send(ServerMessage::Pong { ts }).await;
                Ok(())
            }
            ClientMessage::Prompt { payload, client_message_id, chat_session_id } => {
                let session_id = chat_session_id.unwrap_or_else(|| handle.user_id.clone());
                self.run_prompt(handle, cwd, &session_id, &payload.text, client_message_id, out).await
            }
            ClientMessage::Command { payload, client_message_id } => {
                self.run_command(handle, cwd, payload, client_message_id, out).await
            }
            ClientMessage::Interrupt => {
                handle.interrupt().await;
                Ok(())
            }
            ClientMessage::ClearHistory => {
                let db = self.db.lock().await;
                history::trim(db.conn(), &handle.user_id, 0).map_err(NodeError::Storage)?;
                self.sessions.reset(&handle.user_id, ResetOptions { preserve_thread_for_resume: true });
                Ok(())
            }
            ClientMessage::TaskResume { payload } => {
                self.run_prompt(handle, cwd, &payload.task_id, "", None, out).await
            }
        }
    }

    async fn run_command(
        &self,
        handle: &AgentHandle,
        cwd: &Path,
        payload: CommandPayload,
        client_message_id: Option<String>,
        out: &mpsc::Sender<ServerMessage>,
    ) -> NodeResult<()> {
        if let Some(id) = &client_message_id {
            let _ = out.send(ServerMessage::Ack { client_message_id: id.clone(), duplicate: false }).await;
        }
        let built = self
            .sessions
            .get_or_create(&handle.user_id, cwd, false)
            .await
            .map_err(|e| NodeError::Config(e.to_string()))?;

        let text = payload.text();
        let mut parts = text.splitn(2, ' ');
        let verb = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        let reply = match verb {
            "/pwd" => cwd.display().to_string(),
            "/agent" if !rest.is_empty() => match built.orchestrator.switch_agent(rest) {
                Ok(()) => format!("switched active agent to {rest}"),
                Err(e) => {
                    let kinded = e.error_kind();
                    let _ = out
                        .send(ServerMessage::Error { kind: kinded.as_str().to_string(), message: e.to_string() })
                        .await;
                    return Ok(());
                }
            },
            _ => format!("unknown command: {text}"),
        };

        if !payload.is_silent() {
            let _ = out.send(ServerMessage::Message { role: "system".to_string(), content: reply }).await;
        }
        Ok(())
    }

    async fn run_prompt(
        &self,
        handle: &AgentHandle,
        cwd: &Path,
        session_id: &str,
        text: &str,
        client_message_id: Option<String>,
        out: &mpsc::Sender<ServerMessage>,
    ) -> NodeResult<()> {
        // Ack and persist to history before the workspace lock is acquired,
        // so a queued prompt is durable even if the node restarts before the
        // turn runs.
        let kind = client_message_id.as_deref().map(|id| format!("client_message_id:{id}"));
        {
            let db = self.db.lock().await;
            let inserted = history::add(
                db.conn(),
                session_id,
                "user",
                text,
                chrono::Utc::now(),
                kind.as_deref(),
                self.max_history_text_length,
            )
            .map_err(NodeError::Storage)?;
            if let Some(id) = &client_message_id {
                let _ = out
                    .send(ServerMessage::Ack { client_message_id: id.clone(), duplicate: !inserted })
                    .await;
                if !inserted {
                    return Ok(());
                }
            }
        }

        let _guard = self.locks.acquire(&self.workspace_root).await;

        let built = self
            .sessions
            .get_or_create(&handle.user_id, cwd, true)
            .await
            .map_err(|e| NodeError::Config(e.to_string()))?;

        let agent_id =
            built.orchestrator.get_active_agent_id().unwrap_or_else(|| ads_bootstrap::PRIMARY_AGENT_ID.to_string());

        let cancel = handle.begin_turn().await;
        let (tx, mut rx) = mpsc::channel(64);
        let hub = built.hub.clone();
        let input = match built.vsearch.auto_context(session_id, text).await {
            Some(context) => format!("{text}\n\n## Relevant context\n\n{context}"),
            None => text.to_string(),
        };
        let agent_id_for_turn = agent_id.clone();
        let turn = tokio::spawn(async move {
            hub.run_turn(&agent_id_for_turn, &input, TurnOptions::default(), tx, cancel).await
        });

        let mut final_text = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                HubEvent::TextDelta(delta) => {
                    let _ = out.send(ServerMessage::MessageDelta { role: "assistant".to_string(), delta }).await;
                }
                HubEvent::TextComplete(text) => final_text = text,
                HubEvent::Error(message) => {
                    let _ = out
                        .send(ServerMessage::Error {
                            kind: ads_core::ErrorKind::Upstream.as_str().to_string(),
                            message,
                        })
                        .await;
                }
                HubEvent::TurnComplete | HubEvent::ThinkingDelta(_) | HubEvent::ThinkingComplete(_) => {}
                _ => {}
            }
        }
        handle.end_turn().await;

        match turn.await.map_err(|e| NodeError::Config(e.to_string()))? {
            Ok(outcome) => {
                if final_text.is_empty() {
                    final_text = outcome.response;
                }
                let db = self.db.lock().await;
                history::add(
                    db.conn(),
                    session_id,
                    "assistant",
                    &final_text,
                    chrono::Utc::now(),
                    None,
                    self.max_history_text_length,
                )
                .map_err(NodeError::Storage)?;
                history::trim(db.conn(), session_id, self.max_history_entries).map_err(NodeError::Storage)?;
                drop(db);
                self.sessions.save_thread_id(&handle.user_id, &agent_id, session_id).await.ok();
                let _ = out.send(ServerMessage::Message { role: "assistant".to_string(), content: final_text }).await;
                Ok(())
            }
            Err(e) => {
                let kind = e.error_kind();
                let _ = out.send(ServerMessage::Error { kind: kind.as_str().to_string(), message: e.to_string() }).await;
                Ok(())
            }
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }
}
