// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Default number of lines returned when the caller does not specify a limit.
const DEFAULT_LINE_LIMIT: usize = 200;
/// Hard byte ceiling applied in addition to the line limit.
const MAX_BYTES: usize = 20_000;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Reads a text file. Default: 200 lines / 20 KB, whichever comes first.\n\
         Lines are formatted as L{n}: content (1-indexed) so apply_patch context lines match up.\n\
         Use offset + limit to page through larger files rather than reading them whole."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file" },
                "offset": { "type": "integer", "description": "1-indexed line number to start from (default 1)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return (default 200)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'path'"),
        };
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(1).max(1) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path = %path, offset, limit, "read tool");

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let text = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = text.lines().collect();
        let total = all_lines.len();
        let start = (offset - 1).min(total);
        let end = (start + limit).min(total);

        let mut out = String::new();
        let mut emitted_bytes = 0usize;
        let mut last_line = start;
        for (i, line) in all_lines[start..end].iter().enumerate() {
            let rendered = format!("L{}: {}\n", start + i + 1, line);
            if emitted_bytes + rendered.len() > MAX_BYTES {
                break;
            }
            emitted_bytes += rendered.len();
            out.push_str(&rendered);
            last_line = start + i + 1;
        }

        if last_line < total {
            out.push_str(&format!(
                "\n...[{} more lines; re-read with offset={} to continue]",
                total - last_line,
                last_line + 1
            ));
        }

        ToolOutput::ok(&call.id, out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "r1".into(), name: "read".into(), args }
    }

    fn tmp_file(content: &str) -> String {
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/ads_read_test_{}_{n}.txt", std::process::id());
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_with_line_numbers() {
        let path = tmp_file("one\ntwo\nthree\n");
        let out = ReadTool.execute(&call(json!({"path": path}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("L1: one"));
        assert!(out.content.contains("L3: three"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn offset_and_limit_page_through_file() {
        let body: String = (1..=10).map(|i| format!("line{i}\n")).collect();
        let path = tmp_file(&body);
        let out = ReadTool.execute(&call(json!({"path": path, "offset": 5, "limit": 2}))).await;
        assert!(out.content.contains("L5: line5"));
        assert!(out.content.contains("L6: line6"));
        assert!(!out.content.contains("L7:"));
        assert!(out.content.contains("more lines"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let out = ReadTool.execute(&call(json!({"path": "/tmp/ads_no_such_file_xyz"}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn missing_path_param_is_error() {
        let out = ReadTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'path'"));
    }
}
