// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! All callers (HTTP front, WebSocket front, sub-agent spawner) use
//! `build_tool_registry` with the appropriate [`ToolSetProfile`] instead of
//! each inlining their own registration loop.

use std::sync::Arc;

use ads_config::Config;
use ads_tools::{
    AgentTool, ApplyPatchTool, ExecTool, FindTool, GrepTool, ReadTool, SearchTool, ToolRegistry,
    VsearchTool, WriteTool,
};

use crate::context::{ToolSetProfile, VsearchWiring};

/// Build a [`ToolRegistry`] populated according to the given `profile`,
/// plus a concrete handle to the registered `vsearch` tool — callers that
/// need more than the generic [`ads_tools::Tool::execute`] interface (the
/// implicit auto-context injection hook) use the returned handle directly
/// instead of downcasting out of the registry.
///
/// This is the single canonical place where tools are wired up. Adding a new
/// tool means registering it here once and it appears wherever the matching
/// profile is used.
pub fn build_tool_registry(
    cfg: &Config,
    profile: ToolSetProfile,
    vsearch: VsearchWiring,
) -> (ToolRegistry, Arc<VsearchTool>) {
    let mut reg = ToolRegistry::new();

    reg.register(ReadTool);
    reg.register(WriteTool);
    reg.register(ApplyPatchTool);
    reg.register(ExecTool);
    reg.register(FindTool);
    reg.register(GrepTool);
    reg.register(SearchTool::new(cfg.tools.web.search.clone()));

    let vsearch_tool = Arc::new(VsearchTool::new(vsearch.workspace_root, cfg.vector_context.clone(), vsearch.store));
    reg.register_arc(vsearch_tool.clone());

    match profile {
        ToolSetProfile::Full { invoker } => {
            reg.register(AgentTool::new(invoker));
        }
        ToolSetProfile::SubAgent => {}
    }

    (reg, vsearch_tool)
}
