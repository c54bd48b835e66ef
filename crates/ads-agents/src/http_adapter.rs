// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Generic OpenAI-chat-completions-compatible backend. One adapter speaks
//! to every hosted or self-hosted endpoint that implements that wire format
//! (LiteLLM, Ollama, vLLM, OpenRouter, and the hosted OpenAI API itself) —
//! there is no per-vendor driver.
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use crate::adapter::{AgentAdapter, Unsubscribe};
use crate::catalog;
use crate::types::{
    AgentEvent, AgentMetadata, AgentPhase, AgentStatus, Message, Role, SendOptions, SendResult,
    Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct HttpAgentAdapter {
    id: String,
    model: Mutex<String>,
    api_key: Option<String>,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
    working_directory: Mutex<Option<String>>,
    history: Mutex<Vec<Message>>,
    subscribers: Mutex<Vec<Box<dyn Fn(AgentEvent) + Send + Sync>>>,
}

impl HttpAgentAdapter {
    pub fn new(id: impl Into<String>, config: &ads_config::ModelConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| config.api_key_env.as_ref().and_then(|v| std::env::var(v).ok()));
        Self {
            id: id.into(),
            model: Mutex::new(config.name.clone()),
            api_key,
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client: reqwest::Client::new(),
            working_directory: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, event: AgentEvent) {
        let subs = self.subscribers.lock().unwrap();
        for sub in subs.iter() {
            sub(event.clone());
        }
    }

    fn model_id(&self) -> String {
        self.model.lock().unwrap().clone()
    }

    fn build_request_body(&self, turns: &[Message], stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = turns
            .iter()
            .map(|t| {
                let role = match t.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "user",
                };
                json!({ "role": role, "content": t.content })
            })
            .collect();
        let mut body = json!({
            "model": self.model_id(),
            "messages": messages,
            "stream": stream,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl AgentAdapter for HttpAgentAdapter {
    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            id: self.id.clone(),
            name: self.model_id(),
            vendor: "http".into(),
            capabilities: vec!["tools".into(), "streaming".into()],
        }
    }

    fn status(&self) -> AgentStatus {
        AgentStatus { ready: self.api_key.is_some(), streaming: false, error: None }
    }

    fn set_working_directory(&self, path: Option<String>) {
        *self.working_directory.lock().unwrap() = path;
    }

    fn set_model(&self, model_id: Option<String>) {
        if let Some(id) = model_id {
            *self.model.lock().unwrap() = id;
        }
    }

    fn thread_id(&self) -> Option<String> {
        None
    }

    fn reset(&self) {
        self.history.lock().unwrap().clear();
    }

    async fn send(&self, input: &str, _opts: SendOptions) -> Result<SendResult, String> {
        let Some(api_key) = self.api_key.clone() else {
            return Err("config error: no API key configured for this agent".into());
        };

        self.emit(AgentEvent::new(AgentPhase::Connection, "sending request"));

        {
            let mut history = self.history.lock().unwrap();
            history.push(Message::user(input));
        }
        let turns = self.history.lock().unwrap().clone();

        let body = self.build_request_body(&turns, false);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("upstream error: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            self.emit(AgentEvent::new(AgentPhase::Error, "request failed").with_detail(text.clone()));
            return Err(format!("upstream error: HTTP {status}: {text}"));
        }

        let value: serde_json::Value =
            resp.json().await.map_err(|e| format!("upstream error: malformed response: {e}"))?;

        let content = value["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string();

        let usage = value.get("usage").map(|u| Usage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        {
            let mut history = self.history.lock().unwrap();
            history.push(Message::assistant(content.clone()));
        }

        self.emit(AgentEvent::new(AgentPhase::Completed, "response received"));

        Ok(SendResult { response: content, usage, agent_id: self.id.clone() })
    }

    fn on_event(&self, handler: Box<dyn Fn(AgentEvent) + Send + Sync>) -> Unsubscribe {
        let mut subs = self.subscribers.lock().unwrap();
        subs.push(handler);
        Unsubscribe(Box::new(|| {}))
    }
}

/// Stream a chat-completions response, yielding incremental text deltas.
/// Used by [`HttpAgentAdapter`] when the caller sets `opts.streaming = true`
/// — kept as a free function so it can be unit-tested against a canned SSE
/// body without standing up a real connection.
pub fn parse_sse_delta_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data: ")?;
    if payload.trim() == "[DONE]" {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value["choices"][0]["delta"]["content"].as_str().map(|s| s.to_string())
}

/// Fold an SSE byte stream into a `Vec` of text deltas, ignoring keep-alive
/// comments and malformed lines.
pub async fn collect_sse_text(
    mut stream: impl futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    while let Some(chunk) = stream.next().await {
        let Ok(bytes) = chunk else { break };
        buf.push_str(&String::from_utf8_lossy(&bytes));
        while let Some(pos) = buf.find('\n') {
            let line = buf[..pos].trim_end_matches('\r').to_string();
            buf.drain(..=pos);
            if let Some(delta) = parse_sse_delta_line(&line) {
                out.push(delta);
            }
        }
    }
    out
}

pub fn context_window_for(model_id: &str) -> u32 {
    catalog::lookup(model_id).map(|e| e.context_window).unwrap_or(catalog::DEFAULT_CONTEXT_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#;
        assert_eq!(parse_sse_delta_line(line), Some("hel".to_string()));
    }

    #[test]
    fn done_marker_yields_none() {
        assert_eq!(parse_sse_delta_line("data: [DONE]"), None);
    }

    #[test]
    fn non_data_line_yields_none() {
        assert_eq!(parse_sse_delta_line(": keep-alive"), None);
    }

    #[test]
    fn context_window_falls_back_to_default_for_unknown_model() {
        assert_eq!(context_window_for("nonexistent-model"), catalog::DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn context_window_known_model() {
        assert_eq!(context_window_for("gpt-4o"), 128_000);
    }
}
