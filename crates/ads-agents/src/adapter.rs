// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::types::{AgentEvent, AgentMetadata, AgentStatus, SendOptions, SendResult};
use async_trait::async_trait;

/// An unsubscribe handle returned by [`AgentAdapter::on_event`]. Dropping it
/// has no effect; call [`Unsubscribe::cancel`] to stop receiving events.
pub struct Unsubscribe(pub Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    pub fn cancel(self) {
        (self.0)()
    }
}

/// The contract every backend — hosted HTTP API or in-process mock —
/// implements. An orchestrator holds one `Box<dyn AgentAdapter>` per
/// registered agent id and never needs to know which concrete backend is
/// behind it.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn metadata(&self) -> AgentMetadata;

    fn status(&self) -> AgentStatus;

    /// Scope subsequent tool execution and relative paths to `path`. `None`
    /// clears any override and falls back to the process cwd.
    fn set_working_directory(&self, path: Option<String>);

    /// Switch the model in use. `None` restores the adapter's configured default.
    fn set_model(&self, model_id: Option<String>);

    /// Opaque conversation/thread handle, if the backend maintains server-side
    /// state. `None` means the adapter is stateless and replays full history
    /// on every `send`.
    fn thread_id(&self) -> Option<String>;

    /// Forget in-memory history and any server-side thread handle.
    fn reset(&self);

    async fn send(&self, input: &str, opts: SendOptions) -> Result<SendResult, String>;

    /// Subscribe to the adapter's event stream. The handler is invoked for
    /// every [`AgentEvent`] emitted by in-flight and future `send` calls
    /// until the returned [`Unsubscribe`] is cancelled.
    fn on_event(&self, handler: Box<dyn Fn(AgentEvent) + Send + Sync>) -> Unsubscribe;
}
