// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Integration tests for the agent orchestration runtime using the mock
//! model provider — no network access required.
use std::sync::Arc;

use ads_bootstrap::{AgentBuilder, ToolSetProfileSlot};
use ads_config::{Config, ModelConfig, ToolsConfig};
use ads_hub::{HubEvent, TurnOptions};
use ads_tools::{ApprovalPolicy, ExecTool, ReadTool, Tool, ToolCall, ToolPolicy, WriteTool};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn mock_config() -> Config {
    Config {
        model: ModelConfig { provider: "mock".into(), name: "mock-model".into(), ..ModelConfig::default() },
        ..Config::default()
    }
}

#[tokio::test]
async fn run_turn_returns_mock_response() {
    let built = AgentBuilder::new(Arc::new(mock_config())).build(ToolSetProfileSlot::Full).unwrap();

    let (tx, mut rx) = mpsc::channel(64);
    let outcome = built
        .hub
        .run_turn("primary", "hello", TurnOptions::default(), tx, CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.response.contains("MOCK"), "response was: {}", outcome.response);

    let mut got_text = false;
    while let Ok(event) = rx.try_recv() {
        if let HubEvent::TextComplete(t) = event {
            assert!(t.contains("MOCK"));
            got_text = true;
        }
    }
    assert!(got_text, "expected at least one TextComplete event");
}

#[test]
fn config_defaults_are_valid() {
    let cfg = Config::default();
    assert_eq!(cfg.model.provider, "http");
    assert!(cfg.agent.max_tool_rounds > 0);
    assert!(cfg.agent.compaction_threshold > 0.0);
    assert_eq!(cfg.queue.default_max_retries, 3);
}

#[test]
fn tool_policy_auto_approve() {
    let cfg = ToolsConfig { auto_approve_patterns: vec!["cat *".into(), "ls *".into()], ..ToolsConfig::default() };
    let policy = ToolPolicy::from_config(&cfg);
    assert_eq!(policy.decide("cat /etc/hosts"), ApprovalPolicy::Auto);
    assert_eq!(policy.decide("ls /tmp"), ApprovalPolicy::Auto);
}

#[test]
fn tool_policy_deny() {
    let cfg = ToolsConfig { deny_patterns: vec!["rm -rf /*".into()], ..ToolsConfig::default() };
    let policy = ToolPolicy::from_config(&cfg);
    assert_eq!(policy.decide("rm -rf /*"), ApprovalPolicy::Deny);
}

#[tokio::test]
async fn exec_tool_runs_echo() {
    let tool = ExecTool;
    let call = ToolCall {
        id: "1".into(),
        name: "exec".into(),
        args: serde_json::json!({ "cmd": "echo", "args": ["hello_world"] }),
    };
    let output = tool.execute(&call).await;
    assert!(!output.is_error, "exec failed: {}", output.content);
    assert!(output.content.contains("hello_world"));
}

#[tokio::test]
async fn fs_tools_write_read_roundtrip() {
    let path = format!("/tmp/ads_test_{}.txt", uuid::Uuid::new_v4());

    let write_call = ToolCall {
        id: "w1".into(),
        name: "write".into(),
        args: serde_json::json!({ "path": path, "content": "roundtrip", "append": false }),
    };
    let wo = WriteTool.execute(&write_call).await;
    assert!(!wo.is_error, "write failed: {}", wo.content);

    let read_call = ToolCall { id: "r1".into(), name: "read".into(), args: serde_json::json!({ "path": path }) };
    let ro = ReadTool.execute(&read_call).await;
    assert!(!ro.is_error);
    assert!(ro.content.contains("roundtrip"));

    let _ = std::fs::remove_file(&path);
}
