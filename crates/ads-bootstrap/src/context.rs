// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context types for agent construction.
//!
//! [`RuntimeContext`] holds environment-detected information (project root)
//! that is not part of the config file schema.
//!
//! [`ToolSetProfile`] selects which tools to register.

use std::path::PathBuf;
use std::sync::Arc;

use ads_tools::{AgentInvoker, VectorIndexStore};

// ─── RuntimeContext ───────────────────────────────────────────────────────────

/// Environment-detected context for an agent session.
///
/// Separate from [`ads_config::AgentConfig`] (which holds only config-file
/// fields) so that "what the user configured" and "what we found at
/// runtime" stay cleanly separated.
#[derive(Default, Clone)]
pub struct RuntimeContext {
    /// Absolute path to the project root (detected from `.git` walk-up).
    pub project_root: Option<PathBuf>,
    /// Text appended after the default system prompt Guidelines section.
    pub append_system_prompt: Option<String>,
    /// Full system prompt override (from `--system-prompt-file`).
    pub system_prompt_override: Option<String>,
}

impl RuntimeContext {
    /// Create with an auto-detected project root.
    pub fn auto_detect() -> Self {
        let project_root =
            ads_hub::AgentRuntimeContext::detect_project_root(&std::env::current_dir().unwrap_or_default());
        Self { project_root, append_system_prompt: None, system_prompt_override: None }
    }

    /// Create an empty context (no project detection).
    pub fn empty() -> Self {
        Self::default()
    }
}

// ─── ToolSetProfile ───────────────────────────────────────────────────────────

/// Selects which tool set to register.
///
/// `Full` registers the `agent` delegation tool wired to an [`AgentInvoker`];
/// `SubAgent` omits it so a delegated sub-agent cannot itself delegate —
/// delegation depth is bounded by `AgentConfig::max_delegations` at the hub
/// level instead of by tool availability, but dropping the tool here removes
/// a redundant path to the same recursive-delegation hazard.
pub enum ToolSetProfile {
    Full { invoker: Option<Arc<dyn AgentInvoker>> },
    SubAgent,
}

/// Vector Auto-Context wiring for [`crate::registry::build_tool_registry`]:
/// the workspace root the indexer walks for `docs/**` files, and the
/// History Store/Vector KV bridge it indexes and queries against. `None`
/// store leaves vsearch registered but indexer/auto-context silently no-op,
/// matching the "disabled without endpoint" behavior for a missing bridge.
#[derive(Clone, Default)]
pub struct VsearchWiring {
    pub workspace_root: PathBuf,
    pub store: Option<Arc<dyn VectorIndexStore>>,
}
