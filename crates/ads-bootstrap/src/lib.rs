// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agent construction factory.
//!
//! This crate consolidates all agent-bootstrapping concerns:
//! - Tool-registry building ([`ToolSetProfile::Full`] / [`ToolSetProfile::SubAgent`])
//! - Runtime-context detection and conversion
//! - Wiring the orchestrator's `invoke_agent` back into the `agent` tool
//!
//! Frontends (`ads-node`) depend on this crate instead of inlining their own
//! registry-building and orchestrator-wiring logic.

pub mod agent;
pub mod context;
pub mod registry;

pub use agent::{AgentBuilder, BuiltAgent, ToolSetProfileSlot, PRIMARY_AGENT_ID};
pub use context::{RuntimeContext, ToolSetProfile, VsearchWiring};
pub use registry::build_tool_registry;
