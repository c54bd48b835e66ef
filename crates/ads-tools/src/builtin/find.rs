// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const DEFAULT_LIMIT: usize = 200;
const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", "dist", "__pycache__"];

/// Finds files by name glob, walking the directory tree rooted at `path`.
pub struct FindTool;

#[async_trait]
impl Tool for FindTool {
    fn name(&self) -> &str {
        "find"
    }

    fn description(&self) -> &str {
        "Finds files by name glob (e.g. '**/*.rs', 'Cargo.*'). Auto-excludes .git/ target/ \
         node_modules/ dist/ __pycache__/. Returns paths sorted by modification time, most \
         recent first. Use grep instead when you know the content you're looking for."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern to match file names/paths against" },
                "path": { "type": "string", "description": "Directory to search in (default: current directory)" },
                "limit": { "type": "integer", "description": "Maximum number of paths to return (default 200)" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let pattern = match call.args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing required parameter 'pattern'"),
        };
        let root = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".").to_string();
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_LIMIT as u64) as usize;

        debug!(pattern = %pattern, root = %root, "find tool");

        let root_clone = root.clone();
        let pattern_clone = pattern.clone();
        let result = tokio::task::spawn_blocking(move || walk(&root_clone, &pattern_clone, limit)).await;

        match result {
            Ok(Ok(mut matches)) => {
                let total = matches.len();
                matches.sort_by(|a, b| b.1.cmp(&a.1));
                let truncated = total > limit;
                let names: Vec<String> = matches.into_iter().take(limit).map(|(p, _)| p).collect();
                let mut content = if names.is_empty() {
                    "(no matches)".to_string()
                } else {
                    names.join("\n")
                };
                if truncated {
                    content.push_str(&format!("\n...[{} more matches not shown]", total - limit));
                }
                ToolOutput::ok(&call.id, content)
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("find error: {e}")),
            Err(e) => ToolOutput::err(&call.id, format!("find task panicked: {e}")),
        }
    }
}

/// Convert a path glob (`*`, `?`, `**`) to an anchored [`regex::Regex`].
/// `**` matches across path separators, a single `*` does not.
fn path_glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut re = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                re.push_str(".*");
                i += 2;
            }
            '*' => {
                re.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                re.push('.');
                i += 1;
            }
            c => {
                re.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    re.push('$');
    regex::Regex::new(&re).ok()
}

fn walk(root: &str, pattern: &str, cap: usize) -> std::io::Result<Vec<(String, std::time::SystemTime)>> {
    let glob_re = path_glob_to_regex(pattern);
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|n| !EXCLUDED_DIRS.contains(&n))
                .unwrap_or(true)
        })
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_string_lossy().into_owned();
        let matches = match &glob_re {
            Some(re) => re.is_match(&path) || entry.file_name().to_str().map(|n| re.is_match(n)).unwrap_or(false),
            None => path.contains(pattern),
        };
        if matches {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(std::time::UNIX_EPOCH);
            out.push((path, modified));
        }
        if out.len() >= cap * 4 {
            // Bound the walk on very large trees; the caller still gets the
            // freshest `cap` matches found so far after the final sort.
            break;
        }
    }
    Ok(out)
}
