// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`AgentBuilder`] — single entry point for constructing a fully wired
//! [`Orchestrator`] + [`AgentHub`] pair.
//!
//! Callers pass a [`Config`], an optional [`RuntimeContext`], and the desired
//! [`ToolSetProfile`]. The builder wires the primary model adapter, any
//! named `providers` as additional delegation targets, and a tool registry
//! whose `agent` tool routes back through the same orchestrator.

use std::sync::Arc;

use async_trait::async_trait;

use ads_agents::SendOptions;
use ads_config::Config;
use ads_hub::{AgentHub, AgentRuntimeContext, Orchestrator};
use ads_tools::{AgentInvoker, ToolRegistry, VsearchTool};

use crate::context::{RuntimeContext, ToolSetProfile, VsearchWiring};
use crate::registry::build_tool_registry;

/// Bridges [`ads_tools::AgentInvoker`] (the tool-level delegation hook) to
/// [`Orchestrator::invoke_agent`] without `ads-tools` depending on `ads-hub`.
struct OrchestratorInvoker(Arc<Orchestrator>);

#[async_trait]
impl AgentInvoker for OrchestratorInvoker {
    async fn invoke_agent(&self, agent_id: &str, prompt: &str) -> Result<String, String> {
        self.0
            .invoke_agent(agent_id, prompt, SendOptions::default())
            .await
            .map(|r| r.response)
            .map_err(|e| e.to_string())
    }
}

/// The primary agent id registered by [`AgentBuilder::build`]. Additional
/// `config.providers` entries are registered under their own keys and become
/// `<<<agent.KEY>>>` delegation targets.
pub const PRIMARY_AGENT_ID: &str = "primary";

/// Output of [`AgentBuilder::build`]: a wired orchestrator, the hub that
/// drives turns through it, and the runtime context passed to `system_prompt`.
pub struct BuiltAgent {
    pub orchestrator: Arc<Orchestrator>,
    pub hub: Arc<AgentHub>,
    pub runtime: AgentRuntimeContext,
    /// Concrete handle to the registered `vsearch` tool, for the implicit
    /// auto-context injection hook (spec.md §4.O) — a plain `Tool::execute`
    /// call can't carry the session id a "continue"/"继续" rewrite needs.
    pub vsearch: Arc<VsearchTool>,
}

pub struct AgentBuilder {
    config: Arc<Config>,
    runtime_ctx: RuntimeContext,
    vsearch: VsearchWiring,
}

impl AgentBuilder {
    /// Create a builder with the given configuration. Runtime context
    /// defaults to empty (no project-root detection).
    pub fn new(config: Arc<Config>) -> Self {
        Self { config, runtime_ctx: RuntimeContext::empty(), vsearch: VsearchWiring::default() }
    }

    /// Set the runtime context (project root, prompt overrides).
    pub fn with_runtime_context(mut self, ctx: RuntimeContext) -> Self {
        self.runtime_ctx = ctx;
        self
    }

    /// Wire Vector Auto-Context (spec.md §4.O) to `workspace_root` and the
    /// given History Store/Vector KV bridge.
    pub fn with_vsearch(mut self, wiring: VsearchWiring) -> Self {
        self.vsearch = wiring;
        self
    }

    /// Build the wired [`Orchestrator`] + [`AgentHub`] pair.
    ///
    /// Registers the primary adapter from `config.model`, then every entry
    /// in `config.providers` under its own key so a `<<<agent.KEY>>>` block
    /// can delegate to it. The tool registry's `agent` tool is wired to route
    /// back through the same orchestrator, so a registered agent can also
    /// delegate via a plain tool call instead of the fenced-block protocol.
    pub fn build(self, profile_invoker_slot: ToolSetProfileSlot) -> anyhow::Result<BuiltAgent> {
        let orchestrator = Arc::new(Orchestrator::new());

        let primary = ads_agents::from_config(PRIMARY_AGENT_ID, &self.config.model)?;
        orchestrator.register(PRIMARY_AGENT_ID, Arc::from(primary));

        for (id, provider_cfg) in &self.config.providers {
            let adapter = ads_agents::from_config(id, provider_cfg)?;
            orchestrator.register(id.clone(), Arc::from(adapter));
        }

        let profile = match profile_invoker_slot {
            ToolSetProfileSlot::Full => {
                ToolSetProfile::Full { invoker: Some(Arc::new(OrchestratorInvoker(orchestrator.clone()))) }
            }
            ToolSetProfileSlot::SubAgent => ToolSetProfile::SubAgent,
        };
        let (registry, vsearch): (ToolRegistry, Arc<VsearchTool>) =
            build_tool_registry(&self.config, profile, self.vsearch);

        let hub = Arc::new(AgentHub::new(
            orchestrator.clone(),
            Arc::new(registry),
            Arc::new(self.config.agent.clone()),
        ));

        let runtime = AgentRuntimeContext {
            project_root: self.runtime_ctx.project_root,
            append_system_prompt: self.runtime_ctx.append_system_prompt,
            system_prompt_override: self.runtime_ctx.system_prompt_override,
        };

        Ok(BuiltAgent { orchestrator, hub, runtime, vsearch })
    }
}

/// Which [`ToolSetProfile`] to build, without exposing the invoker wiring
/// (the builder constructs it internally once the orchestrator exists).
pub enum ToolSetProfileSlot {
    Full,
    SubAgent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_config::ModelConfig;

    fn mock_config() -> Config {
        Config {
            model: ModelConfig { provider: "mock".into(), name: "mock-model".into(), ..ModelConfig::default() },
            ..Config::default()
        }
    }

    #[test]
    fn build_registers_the_primary_agent() {
        let built = AgentBuilder::new(Arc::new(mock_config())).build(ToolSetProfileSlot::Full).unwrap();
        assert!(built.orchestrator.has_agent(PRIMARY_AGENT_ID));
    }

    #[test]
    fn build_registers_named_providers_as_delegation_targets() {
        let mut cfg = mock_config();
        cfg.providers.insert(
            "aux".into(),
            ModelConfig { provider: "mock".into(), name: "mock-aux".into(), ..ModelConfig::default() },
        );
        let built = AgentBuilder::new(Arc::new(cfg)).build(ToolSetProfileSlot::Full).unwrap();
        assert!(built.orchestrator.has_agent("aux"));
    }

    #[test]
    fn sub_agent_profile_builds_without_an_agent_tool() {
        let built =
            AgentBuilder::new(Arc::new(mock_config())).build(ToolSetProfileSlot::SubAgent).unwrap();
        assert!(built.orchestrator.has_agent(PRIMARY_AGENT_ID));
    }

    #[tokio::test]
    async fn hub_can_run_a_turn_against_the_mock_primary() {
        let built = AgentBuilder::new(Arc::new(mock_config())).build(ToolSetProfileSlot::Full).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let outcome = built
            .hub
            .run_turn(
                PRIMARY_AGENT_ID,
                "hello",
                ads_hub::TurnOptions::default(),
                tx,
                tokio_util::sync::CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.response.contains("hello"));
    }
}
