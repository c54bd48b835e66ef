// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use ads_config::AgentMode;
use ads_tools::ToolCall;

/// Events emitted while an [`crate::AgentHub`] turn runs.
/// Consumers (WebSocket front, HTTP polling) subscribe to these to stream
/// progress back to a client without waiting for the whole turn to finish.
///
/// Distinct from [`ads_agents::AgentEvent`], which is the per-adapter
/// streaming phase signal a single model connection emits; a `HubEvent`
/// is the host-level view across tool execution, delegation and compaction.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A text chunk streamed from the active agent
    TextDelta(String),
    /// A complete text response from the active agent (after streaming finishes)
    TextComplete(String),
    /// A thinking/reasoning chunk (extended thinking API), when the adapter exposes one
    ThinkingDelta(String),
    /// A complete thinking/reasoning block (accumulated from ThinkingDelta events)
    ThinkingComplete(String),
    /// A `<<<tool.NAME>>>` block was extracted and is about to execute
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished { call_id: String, tool_name: String, output: String, is_error: bool },
    /// A `<<<agent.ID>>>` block was extracted and delegation to that agent is starting
    DelegationStarted { agent_id: String, prompt: String },
    /// A delegated sub-turn finished
    DelegationFinished { agent_id: String, response: String },
    /// The supervisor is being re-invoked with delegation results to reconcile
    SupervisorRoundStarted { round: u32 },
    /// Context was compacted; statistics for the consumer
    ContextCompacted { tokens_before: usize, tokens_after: usize },
    /// Current token usage update
    TokenUsage {
        input: u32,
        output: u32,
        context_total: usize,
        cache_read: u32,
        cache_write: u32,
    },
    /// The hub has finished processing the current user turn
    TurnComplete,
    /// A recoverable error occurred
    Error(String),
    /// The active agent mode was changed
    ModeChanged(AgentMode),
}
