// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use ads_config::AgentMode;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Delegation hook injected into the tool context. The orchestrator (which
/// owns the `agent_id → AgentAdapter` map) implements this; ads-tools only
/// needs the trait object, so it never depends on ads-hub directly.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke_agent(&self, agent_id: &str, prompt: &str) -> Result<String, String>;
}

/// Dispatches `<<<agent.ID>>>` delegation payloads to another registered
/// agent via [`AgentInvoker`]. Returns an error if no invoker was wired in —
/// this mirrors the spec's "ctx lacks invoke_agent" failure mode rather than
/// panicking or silently no-opping.
pub struct AgentTool {
    invoker: Option<Arc<dyn AgentInvoker>>,
}

impl AgentTool {
    pub fn new(invoker: Option<Arc<dyn AgentInvoker>>) -> Self {
        Self { invoker }
    }
}

/// Parse either `{agentId, prompt}` or the bare-string form `"agentId\nprompt…"`.
fn parse_payload(args: &Value) -> Result<(String, String), String> {
    if let Some(obj) = args.as_object() {
        let agent_id = obj
            .get("agentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required field 'agentId'".to_string())?
            .to_string();
        let prompt = obj
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing required field 'prompt'".to_string())?
            .to_string();
        return Ok((agent_id, prompt));
    }
    if let Some(s) = args.as_str() {
        let mut parts = s.splitn(2, '\n');
        let agent_id = parts.next().unwrap_or_default().trim().to_string();
        let prompt = parts.next().unwrap_or_default().trim().to_string();
        if agent_id.is_empty() || prompt.is_empty() {
            return Err("expected 'agentId\\nprompt…'".to_string());
        }
        return Ok((agent_id, prompt));
    }
    Err("payload must be an object {agentId, prompt} or a string 'agentId\\nprompt'".to_string())
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        "agent"
    }

    fn description(&self) -> &str {
        "Delegates to another registered agent. Payload is {agentId, prompt} or the string \
         form 'agentId\\nprompt…'. Distinct from <<<agent.ID>>> delegation blocks, which the \
         Agent Hub dispatches directly — this tool exists for agents that prefer to delegate \
         through the tool-call channel instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agentId": { "type": "string", "description": "Identifier of the agent to invoke" },
                "prompt": { "type": "string", "description": "Prompt to send to that agent" }
            },
            "required": ["agentId", "prompt"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (agent_id, prompt) = match parse_payload(&call.args) {
            Ok(pair) => pair,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let invoker = match &self.invoker {
            Some(i) => i,
            None => return ToolOutput::err(&call.id, "agent delegation is unavailable: no invoker configured"),
        };

        debug!(agent_id = %agent_id, "agent tool: delegating");

        match invoker.invoke_agent(&agent_id, &prompt).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, format!("agent '{agent_id}' failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::ToolCall;

    struct EchoInvoker;

    #[async_trait]
    impl AgentInvoker for EchoInvoker {
        async fn invoke_agent(&self, agent_id: &str, prompt: &str) -> Result<String, String> {
            if agent_id == "broken" {
                return Err("simulated failure".into());
            }
            Ok(format!("{agent_id} says: {prompt}"))
        }
    }

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "a1".into(), name: "agent".into(), args }
    }

    #[tokio::test]
    async fn delegates_with_object_payload() {
        let tool = AgentTool::new(Some(Arc::new(EchoInvoker)));
        let out = tool.execute(&call(json!({"agentId": "aux", "prompt": "summarize"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(out.content, "aux says: summarize");
    }

    #[tokio::test]
    async fn delegates_with_string_payload() {
        let tool = AgentTool::new(Some(Arc::new(EchoInvoker)));
        let out = tool.execute(&call(json!("aux\nsummarize this"))).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "aux says: summarize this");
    }

    #[tokio::test]
    async fn missing_invoker_is_error() {
        let tool = AgentTool::new(None);
        let out = tool.execute(&call(json!({"agentId": "aux", "prompt": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("unavailable"));
    }

    #[tokio::test]
    async fn invoker_error_is_surfaced() {
        let tool = AgentTool::new(Some(Arc::new(EchoInvoker)));
        let out = tool.execute(&call(json!({"agentId": "broken", "prompt": "x"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("simulated failure"));
    }

    #[test]
    fn missing_agent_id_is_error() {
        assert!(parse_payload(&json!({"prompt": "x"})).is_err());
    }
}
