// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use ads_config::AgentMode;

use crate::command::{run_command, CommandRequest};
use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const DEFAULT_TIMEOUT_MS: u64 = 5 * 60 * 1000;
const MAX_OUTPUT_BYTES: usize = 100_000;

/// Runs an arbitrary shell command through the Command Runner.
///
/// Non-zero exit codes are reported back as tool output, not as a denial —
/// the agent decides what a non-zero exit means for its task.
pub struct ExecTool;

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Runs a shell command and returns exit code, stdout, and stderr.\n\
         Use read/write/apply_patch for file edits, grep/search for lookups;\n\
         reserve exec for build tools, test runners, and git.\n\
         Subject to the configured command allowlist; denied commands return an error.\n\
         Default timeout is 5 minutes; output beyond 100,000 bytes per stream is truncated."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cmd": { "type": "string", "description": "The command to execute" },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Arguments to the command (not shell-interpreted)"
                },
                "cwd": { "type": "string", "description": "Working directory (default: workspace root)" },
                "timeout_ms": { "type": "integer", "description": "Timeout in milliseconds (default 300000)" }
            },
            "required": ["cmd"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let cmd = match call.args.get("cmd").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'cmd'"),
        };
        let args: Vec<String> = call
            .args
            .get("args")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let cwd = call
            .args
            .get("cwd")
            .and_then(|v| v.as_str())
            .map(std::path::PathBuf::from);
        let timeout_ms = call
            .args
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        debug!(cmd = %cmd, "exec tool");

        let req = CommandRequest {
            cmd,
            args,
            cwd,
            env: Vec::new(),
            timeout_ms,
            max_output_bytes: MAX_OUTPUT_BYTES,
        };

        match run_command(req).await {
            Ok(result) => {
                let mut content = format!(
                    "$ {}\nexit: {}\nelapsed_ms: {}",
                    result.command_line,
                    result
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "none".into()),
                    result.elapsed_ms
                );
                if result.timed_out {
                    content.push_str("\ntimed out");
                }
                if !result.stdout.is_empty() {
                    content.push_str("\n--- stdout ---\n");
                    content.push_str(&result.stdout);
                    if result.truncated_stdout {
                        content.push_str("\n...[stdout truncated]");
                    }
                }
                if !result.stderr.is_empty() {
                    content.push_str("\n--- stderr ---\n");
                    content.push_str(&result.stderr);
                    if result.truncated_stderr {
                        content.push_str("\n...[stderr truncated]");
                    }
                }

                let failed = result.timed_out || result.exit_code.map(|c| c != 0).unwrap_or(true);
                if failed {
                    ToolOutput::err(&call.id, content)
                } else {
                    ToolOutput::ok(&call.id, content)
                }
            }
            Err(e) => ToolOutput::err(&call.id, format!("exec error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "e1".into(), name: "exec".into(), args }
    }

    #[tokio::test]
    async fn runs_and_reports_exit_zero() {
        let out = ExecTool.execute(&call(json!({"cmd": "echo", "args": ["hi"]}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("hi"));
        assert!(out.content.contains("exit: 0"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_error() {
        let out = ExecTool.execute(&call(json!({"cmd": "sh", "args": ["-c", "exit 7"]}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("exit: 7"));
    }

    #[tokio::test]
    async fn missing_cmd_is_error() {
        let out = ExecTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'cmd'"));
    }

    #[test]
    fn only_available_in_agent_mode() {
        assert_eq!(ExecTool.modes(), &[AgentMode::Agent]);
    }
}
