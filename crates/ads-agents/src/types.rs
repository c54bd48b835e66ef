// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// `AgentEvent { phase, title, detail?, raw }` — the uniform event stream
/// every adapter emits while a `send` is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub phase: AgentPhase,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Raw provider payload for this event, preserved for debugging/logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl AgentEvent {
    pub fn new(phase: AgentPhase, title: impl Into<String>) -> Self {
        Self { phase, title: title.into(), detail: None, raw: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Boot,
    Connection,
    Analysis,
    Command,
    Editing,
    Tool,
    Responding,
    Completed,
    Error,
}

/// `metadata: {id, name, vendor, capabilities}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub capabilities: Vec<String>,
}

/// `status() -> {ready, streaming, error?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStatus {
    pub ready: bool,
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Options accepted by `send`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub output_schema: Option<serde_json::Value>,
    pub streaming: bool,
}

/// `{response, usage?, agentId}` returned by `send`.
#[derive(Debug, Clone)]
pub struct SendResult {
    pub response: String,
    pub usage: Option<Usage>,
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A single conversation turn. Used both as the host-side session log entry
/// and, filtered to `{System, User, Assistant}`, as the wire turn
/// [`crate::HttpAgentAdapter`] sends to a chat-completions backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool result recorded in the host-side session log. Never sent to an
    /// adapter directly — folded into the next `send` input as plain text.
    Tool,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        Some(&self.content)
    }

    pub fn approx_tokens(&self) -> usize {
        approx_tokens(&self.content)
    }
}

/// Approximate token count using a 4-chars-per-token heuristic, the same
/// rough budgeting rule used across the context-compaction logic.
pub fn approx_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_event_builder_sets_detail() {
        let e = AgentEvent::new(AgentPhase::Tool, "running exec").with_detail("cmd=ls");
        assert_eq!(e.phase, AgentPhase::Tool);
        assert_eq!(e.detail.as_deref(), Some("cmd=ls"));
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        assert_eq!(approx_tokens(""), 1);
        assert_eq!(approx_tokens("hi"), 1);
    }

    #[test]
    fn approx_tokens_divides_by_four() {
        assert_eq!(approx_tokens("12345678"), 2);
    }

    #[test]
    fn agent_status_default_is_not_ready() {
        let s = AgentStatus::default();
        assert!(!s.ready);
        assert!(s.error.is_none());
    }

    #[test]
    fn message_constructors_set_role() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::assistant("hi").role, Role::Assistant);
        assert_eq!(Message::system("hi").role, Role::System);
        assert_eq!(Message::tool("hi").role, Role::Tool);
    }

    #[test]
    fn message_approx_tokens_matches_free_function() {
        let m = Message::user("12345678");
        assert_eq!(m.approx_tokens(), approx_tokens("12345678"));
    }
}
