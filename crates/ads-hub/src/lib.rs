// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod blocks;
mod compact;
mod events;
mod hub;
mod orchestrator;
mod prompts;
mod runtime_context;
mod session;

pub use blocks::{parse_blocks, strip_blocks, strip_delegation_blocks, Block, DelegationBlock, ToolBlock};
pub use compact::{
    compact_session, compact_session_with_strategy, emergency_compact, smart_truncate,
};
pub use events::HubEvent;
pub use hub::{AgentHub, DelegationRecord, HubError, TurnOptions, TurnOutcome};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use prompts::{system_prompt, tool_and_delegation_guide, AgentGuideEntry, PromptContext, ToolGuideEntry};
pub use runtime_context::AgentRuntimeContext;
pub use session::{Session, TurnRecord};
