// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! WebSocket message schema between a connected client and a workspace
//! session, encoded as JSON text frames.
//!
//! # Typical flow
//!
//! ```text
//! Client                              Node
//!    │                                   │
//!    │── {"type":"prompt", ...} ────────►│  ack (dedupe check) sent first
//!    │◄─ {"type":"ack", ...} ─────────────│
//!    │                                   │  workspace lock acquired, turn runs
//!    │◄─ {"type":"message_delta", ...} ───│
//!    │◄─ {"type":"message", ...} ─────────│
//!    │                                   │
//!    │── {"type":"interrupt"} ──────────►│  aborts the active turn
//! ```
//!
//! # JSON round-trip
//!
//! ```rust
//! # use ads_node::control::protocol::*;
//! let cmd = ClientMessage::Prompt {
//!     payload: PromptPayload { text: "refactor the auth module".to_string(), images: None },
//!     client_message_id: Some("cm-1".to_string()),
//!     chat_session_id: None,
//! };
//! let json = serde_json::to_string(&cmd).unwrap();
//! let back: ClientMessage = serde_json::from_str(&json).unwrap();
//! assert!(matches!(back, ClientMessage::Prompt { .. }));
//! ```

use serde::{Deserialize, Serialize};

// ── Client → Node messages ────────────────────────────────────────────────────

/// A message received from a connected WebSocket client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; answered with [`ServerMessage::Pong`].
    Ping,

    /// A user prompt to run through the active agent.
    Prompt {
        payload: PromptPayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
        #[serde(rename = "chatSessionId", skip_serializing_if = "Option::is_none")]
        chat_session_id: Option<String>,
    },

    /// A built-in slash command (`/cd`, `/pwd`, `/search`, `/vsearch`,
    /// `/agent ID`, `/review`, …), handled inline rather than by the agent.
    Command {
        payload: CommandPayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
    },

    /// Abort the active turn for this connection's user.
    Interrupt,

    /// Clear the history-key bucket and reset the orchestrator, preserving
    /// the thread id so `/resume` keeps working afterward.
    ClearHistory,

    /// Rehydrate the saved thread id for `task_id` and continue an
    /// interrupted task.
    TaskResume { payload: TaskResumePayload },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// A command payload is either a bare string (equivalent to
/// `{text, silent:false}`) or an explicit object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandPayload {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        silent: bool,
    },
}

impl CommandPayload {
    pub fn text(&self) -> &str {
        match self {
            CommandPayload::Text(t) => t,
            CommandPayload::Full { text, .. } => text,
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, CommandPayload::Full { silent: true, .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResumePayload {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

// ── Node → Client messages ────────────────────────────────────────────────────

/// A message sent to a connected WebSocket client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong {
        ts: i64,
    },

    /// Acknowledges a `prompt` or `command` whose `client_message_id` was
    /// set. Sent before the workspace lock is acquired, so a queued message
    /// is durably known even if the node restarts before it runs.
    Ack {
        client_message_id: String,
        duplicate: bool,
    },

    /// A streaming text delta from the active agent turn.
    MessageDelta {
        role: String,
        delta: String,
    },

    /// A complete message (user, assistant, tool, or status) appended to
    /// history.
    Message {
        role: String,
        content: String,
    },

    /// A recoverable error, tagged with the [`ads_core::ErrorKind`] that
    /// produced it so the client can decide whether to retry.
    Error {
        kind: String,
        message: String,
    },
}

// ── Unit tests ────────────────────────────────────────────────────────────────
