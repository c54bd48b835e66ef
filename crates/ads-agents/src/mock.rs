// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::adapter::{AgentAdapter, Unsubscribe};
use crate::types::{AgentEvent, AgentMetadata, AgentPhase, AgentStatus, SendOptions, SendResult};

/// Deterministic mock adapter for tests. Echoes the input back as the
/// response, prefixed so assertions can tell a mock reply from a real one.
pub struct MockAdapter {
    id: String,
    working_directory: Mutex<Option<String>>,
}

impl MockAdapter {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), working_directory: Mutex::new(None) }
    }
}

#[async_trait]
impl AgentAdapter for MockAdapter {
    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            id: self.id.clone(),
            name: "mock".into(),
            vendor: "mock".into(),
            capabilities: vec![],
        }
    }

    fn status(&self) -> AgentStatus {
        AgentStatus { ready: true, streaming: false, error: None }
    }

    fn set_working_directory(&self, path: Option<String>) {
        *self.working_directory.lock().unwrap() = path;
    }

    fn set_model(&self, _model_id: Option<String>) {}

    fn thread_id(&self) -> Option<String> {
        None
    }

    fn reset(&self) {}

    async fn send(&self, input: &str, _opts: SendOptions) -> Result<SendResult, String> {
        Ok(SendResult {
            response: format!("MOCK: {input}"),
            usage: None,
            agent_id: self.id.clone(),
        })
    }

    fn on_event(&self, _handler: Box<dyn Fn(AgentEvent) + Send + Sync>) -> Unsubscribe {
        Unsubscribe(Box::new(|| {}))
    }
}

/// A pre-scripted mock adapter. Each call to `send` pops the next response
/// off the front of the queue, letting tests pin down exact reply sequences
/// (e.g. a tool-invoking reply followed by a final text reply) without
/// network access.
pub struct ScriptedMockAdapter {
    id: String,
    scripts: Arc<Mutex<Vec<String>>>,
    /// The last input seen by this adapter, recorded for inspection.
    pub last_input: Arc<Mutex<Option<String>>>,
    subscribers: Arc<Mutex<Vec<Box<dyn Fn(AgentEvent) + Send + Sync>>>>,
}

impl ScriptedMockAdapter {
    pub fn new(id: impl Into<String>, scripts: Vec<String>) -> Self {
        Self {
            id: id.into(),
            scripts: Arc::new(Mutex::new(scripts)),
            last_input: Arc::new(Mutex::new(None)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AgentAdapter for ScriptedMockAdapter {
    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            id: self.id.clone(),
            name: "scripted-mock".into(),
            vendor: "mock".into(),
            capabilities: vec![],
        }
    }

    fn status(&self) -> AgentStatus {
        AgentStatus { ready: true, streaming: false, error: None }
    }

    fn set_working_directory(&self, _path: Option<String>) {}

    fn set_model(&self, _model_id: Option<String>) {}

    fn thread_id(&self) -> Option<String> {
        None
    }

    fn reset(&self) {}

    async fn send(&self, input: &str, _opts: SendOptions) -> Result<SendResult, String> {
        *self.last_input.lock().unwrap() = Some(input.to_string());
        let response = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                "[no more scripts]".to_string()
            } else {
                scripts.remove(0)
            }
        };
        for sub in self.subscribers.lock().unwrap().iter() {
            sub(AgentEvent::new(AgentPhase::Completed, "scripted response"));
        }
        Ok(SendResult { response, usage: None, agent_id: self.id.clone() })
    }

    fn on_event(&self, handler: Box<dyn Fn(AgentEvent) + Send + Sync>) -> Unsubscribe {
        self.subscribers.lock().unwrap().push(handler);
        Unsubscribe(Box::new(|| {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_echoes_input() {
        let a = MockAdapter::new("mock-1");
        let result = a.send("hi", SendOptions::default()).await.unwrap();
        assert_eq!(result.response, "MOCK: hi");
        assert_eq!(result.agent_id, "mock-1");
    }

    #[tokio::test]
    async fn mock_status_is_always_ready() {
        let a = MockAdapter::new("mock-1");
        assert!(a.status().ready);
    }

    #[tokio::test]
    async fn scripted_pops_responses_in_order() {
        let a = ScriptedMockAdapter::new("s1", vec!["first".into(), "second".into()]);
        assert_eq!(a.send("q1", SendOptions::default()).await.unwrap().response, "first");
        assert_eq!(a.send("q2", SendOptions::default()).await.unwrap().response, "second");
    }

    #[tokio::test]
    async fn scripted_fallback_when_exhausted() {
        let a = ScriptedMockAdapter::new("s1", vec![]);
        let result = a.send("q", SendOptions::default()).await.unwrap();
        assert!(result.response.contains("no more scripts"));
    }

    #[tokio::test]
    async fn scripted_records_last_input() {
        let a = ScriptedMockAdapter::new("s1", vec!["ok".into()]);
        a.send("remember me", SendOptions::default()).await.unwrap();
        assert_eq!(a.last_input.lock().unwrap().as_deref(), Some("remember me"));
    }

    #[tokio::test]
    async fn scripted_notifies_subscribers() {
        let a = ScriptedMockAdapter::new("s1", vec!["ok".into()]);
        let seen = Arc::new(Mutex::new(false));
        let seen2 = seen.clone();
        let _unsub = a.on_event(Box::new(move |_ev| *seen2.lock().unwrap() = true));
        a.send("hi", SendOptions::default()).await.unwrap();
        assert!(*seen.lock().unwrap());
    }
}
