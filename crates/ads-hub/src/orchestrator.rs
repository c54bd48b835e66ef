// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Holds the set of registered agent adapters for a workspace and routes
//! invocations to them. One `Orchestrator` is created per workspace by the
//! session manager; [`crate::AgentHub`] drives turns through it.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use ads_agents::{AgentAdapter, AgentEvent, AgentMetadata, SendOptions, SendResult, Unsubscribe};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no agent registered with id {0:?}")]
    UnknownAgent(String),
    #[error("adapter error: {0}")]
    Adapter(String),
}

impl ads_core::IntoErrorKind for OrchestratorError {
    fn error_kind(&self) -> ads_core::ErrorKind {
        match self {
            OrchestratorError::UnknownAgent(_) => ads_core::ErrorKind::Config,
            OrchestratorError::Adapter(_) => ads_core::ErrorKind::Upstream,
        }
    }
}

pub struct Orchestrator {
    agents: RwLock<HashMap<String, Arc<dyn AgentAdapter>>>,
    active_agent_id: RwLock<Option<String>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self { agents: RwLock::new(HashMap::new()), active_agent_id: RwLock::new(None) }
    }

    /// Register an adapter under `id`. The first registered agent becomes
    /// active automatically.
    pub fn register(&self, id: impl Into<String>, adapter: Arc<dyn AgentAdapter>) {
        let id = id.into();
        let mut agents = self.agents.write().unwrap();
        agents.insert(id.clone(), adapter);
        let mut active = self.active_agent_id.write().unwrap();
        if active.is_none() {
            *active = Some(id);
        }
    }

    pub fn has_agent(&self, id: &str) -> bool {
        self.agents.read().unwrap().contains_key(id)
    }

    pub fn list_agents(&self) -> Vec<AgentMetadata> {
        self.agents.read().unwrap().values().map(|a| a.metadata()).collect()
    }

    pub fn get_active_agent_id(&self) -> Option<String> {
        self.active_agent_id.read().unwrap().clone()
    }

    pub fn switch_agent(&self, id: &str) -> Result<(), OrchestratorError> {
        if !self.has_agent(id) {
            return Err(OrchestratorError::UnknownAgent(id.to_string()));
        }
        *self.active_agent_id.write().unwrap() = Some(id.to_string());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Arc<dyn AgentAdapter>, OrchestratorError> {
        self.agents
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownAgent(id.to_string()))
    }

    pub async fn invoke_agent(
        &self,
        id: &str,
        input: &str,
        opts: SendOptions,
    ) -> Result<SendResult, OrchestratorError> {
        let adapter = self.get(id)?;
        adapter.send(input, opts).await.map_err(OrchestratorError::Adapter)
    }

    /// Subscribe `handler` to events from every currently registered agent.
    /// Agents registered after this call are not included — callers that
    /// register agents dynamically should call this again.
    pub fn on_event(&self, handler: Arc<dyn Fn(String, AgentEvent) + Send + Sync>) -> Unsubscribe {
        let agents = self.agents.read().unwrap();
        let mut unsubs = Vec::with_capacity(agents.len());
        for (id, adapter) in agents.iter() {
            let id = id.clone();
            let handler = handler.clone();
            unsubs.push(adapter.on_event(Box::new(move |event| handler(id.clone(), event))));
        }
        Unsubscribe(Box::new(move || {
            for u in unsubs {
                u.cancel();
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ads_agents::MockAdapter;

    fn mock(id: &str) -> Arc<dyn AgentAdapter> {
        Arc::new(MockAdapter::new(id))
    }

    #[test]
    fn first_registered_agent_becomes_active() {
        let orch = Orchestrator::new();
        orch.register("a", mock("a"));
        orch.register("b", mock("b"));
        assert_eq!(orch.get_active_agent_id().as_deref(), Some("a"));
    }

    #[test]
    fn switch_agent_updates_active_id() {
        let orch = Orchestrator::new();
        orch.register("a", mock("a"));
        orch.register("b", mock("b"));
        orch.switch_agent("b").unwrap();
        assert_eq!(orch.get_active_agent_id().as_deref(), Some("b"));
    }

    #[test]
    fn switch_agent_rejects_unknown_id() {
        let orch = Orchestrator::new();
        orch.register("a", mock("a"));
        assert!(orch.switch_agent("nonexistent").is_err());
    }

    #[test]
    fn list_agents_reflects_all_registrations() {
        let orch = Orchestrator::new();
        orch.register("a", mock("a"));
        orch.register("b", mock("b"));
        assert_eq!(orch.list_agents().len(), 2);
    }

    #[tokio::test]
    async fn invoke_agent_dispatches_to_the_named_adapter() {
        let orch = Orchestrator::new();
        orch.register("a", mock("a"));
        let result = orch.invoke_agent("a", "hello", SendOptions::default()).await.unwrap();
        assert_eq!(result.response, "MOCK: hello");
    }

    #[tokio::test]
    async fn invoke_agent_errors_on_unknown_id() {
        let orch = Orchestrator::new();
        let err = orch.invoke_agent("missing", "hi", SendOptions::default()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownAgent(_)));
    }
}
