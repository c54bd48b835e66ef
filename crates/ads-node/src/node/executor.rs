// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`HubTaskExecutor`] bridges [`ads_store::TaskQueue`]'s [`TaskExecutor`]
//! trait to [`ads_hub::AgentHub::run_turn`], the same bridge pattern
//! [`ads_bootstrap::agent::OrchestratorInvoker`] uses for tool-level
//! delegation.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use ads_hub::{HubError, HubEvent, TurnOptions};
use ads_store::queries::tasks::Task;
use ads_store::{QueueEvent, TaskExecutor, TaskRunOutcome};

use crate::control::session::SessionManager;

/// Synthetic user id the Session Manager binds unattended task runs to,
/// distinct from any WebSocket-connected operator's id.
const TASK_RUNNER_USER_ID: &str = "__task_queue__";

pub struct HubTaskExecutor {
    sessions: Arc<SessionManager>,
    workspace_root: PathBuf,
}

impl HubTaskExecutor {
    pub fn new(sessions: Arc<SessionManager>, workspace_root: PathBuf) -> Self {
        Self { sessions, workspace_root }
    }
}

#[async_trait]
impl TaskExecutor for HubTaskExecutor {
    async fn run_task(&self, task: &Task, events: broadcast::Sender<QueueEvent>) -> TaskRunOutcome {
        let _ = events.send(QueueEvent::TaskStarted { task_id: task.id.clone() });

        let built = match self.sessions.get_or_create(TASK_RUNNER_USER_ID, &self.workspace_root, false).await {
            Ok(built) => built,
            Err(e) => {
                let _ = events.send(QueueEvent::TaskFailed { task_id: task.id.clone(), reason: e.to_string() });
                return TaskRunOutcome::Failed(e.to_string());
            }
        };
        let agent_id =
            built.orchestrator.get_active_agent_id().unwrap_or_else(|| ads_bootstrap::PRIMARY_AGENT_ID.to_string());

        let _ = events.send(QueueEvent::TaskRunning { task_id: task.id.clone() });

        let (tx, mut rx) = mpsc::channel(64);
        let hub = built.hub.clone();
        let input = task.input.clone();
        let turn = tokio::spawn(async move {
            hub.run_turn(&agent_id, &input, TurnOptions::default(), tx, CancellationToken::new()).await
        });

        while let Some(event) = rx.recv().await {
            match event {
                HubEvent::TextDelta(delta) => {
                    let _ = events.send(QueueEvent::MessageDelta { task_id: task.id.clone(), delta });
                }
                HubEvent::TextComplete(text) => {
                    let _ = events.send(QueueEvent::Message {
                        task_id: task.id.clone(),
                        role: "assistant".to_string(),
                        text,
                    });
                }
                HubEvent::ToolCallStarted(call) => {
                    let _ = events.send(QueueEvent::Command { task_id: task.id.clone(), text: call.name });
                }
                _ => {}
            }
        }

        match turn.await {
            Ok(Ok(outcome)) => {
                let _ = events.send(QueueEvent::Message {
                    task_id: task.id.clone(),
                    role: "assistant".to_string(),
                    text: outcome.response,
                });
                let _ = events.send(QueueEvent::TaskCompleted { task_id: task.id.clone() });
                TaskRunOutcome::Completed
            }
            Ok(Err(HubError::Cancelled)) => {
                let _ = events.send(QueueEvent::TaskCancelled { task_id: task.id.clone() });
                TaskRunOutcome::Aborted
            }
            Ok(Err(e)) => {
                let _ = events.send(QueueEvent::TaskFailed { task_id: task.id.clone(), reason: e.to_string() });
                TaskRunOutcome::Failed(e.to_string())
            }
            Err(e) => {
                let _ = events.send(QueueEvent::TaskFailed { task_id: task.id.clone(), reason: e.to_string() });
                TaskRunOutcome::Failed(e.to_string())
            }
        }
    }
}
