// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Parses the fenced directive grammar a response body may contain:
//! `<<<tool.NAME\n…\n>>>` and `<<<agent.ID\n…\n>>>`. Both share one delimiter
//! grammar but occupy disjoint namespaces, so a single pass over the text
//! yields both kinds of block in source order.
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBlock {
    pub name: String,
    pub body: String,
    /// Byte range of the whole `<<<...>>>` block in the source text.
    pub span: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationBlock {
    pub agent_id: String,
    pub prompt: String,
    pub span: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Tool(ToolBlock),
    Delegation(DelegationBlock),
}

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<<<(tool|agent)\.([a-zA-Z0-9_-]+)\s*\n(.*?)\n?>>>").unwrap()
    })
}

/// Scan `text` for every `<<<tool.*>>>` / `<<<agent.*>>>` block, in source order.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    block_re()
        .captures_iter(text)
        .map(|cap| {
            let whole = cap.get(0).unwrap();
            let kind = &cap[1];
            let id = cap[2].to_string();
            let body = cap[3].to_string();
            let span = (whole.start(), whole.end());
            if kind.eq_ignore_ascii_case("tool") {
                Block::Tool(ToolBlock { name: id.to_lowercase(), body, span })
            } else {
                Block::Delegation(DelegationBlock { agent_id: id, prompt: body, span })
            }
        })
        .collect()
}

/// Return `text` with every `<<<tool.*>>>` / `<<<agent.*>>>` block removed.
pub fn strip_blocks(text: &str) -> String {
    block_re().replace_all(text, "").trim().to_string()
}

/// Return `text` with only delegation blocks removed (tool blocks retained),
/// used by Phase 3 finalization which strips delegations but has already
/// consumed tool blocks earlier in the loop.
pub fn strip_delegation_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for cap in block_re().captures_iter(text) {
        let whole = cap.get(0).unwrap();
        if cap[1].eq_ignore_ascii_case("agent") {
            out.push_str(&text[last..whole.start()]);
            last = whole.end();
        }
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_tool_block() {
        let text = "Let me check.\n<<<tool.read\n{\"path\":\"a.rs\"}\n>>>\nDone.";
        let blocks = parse_blocks(text);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Tool(t) => {
                assert_eq!(t.name, "read");
                assert_eq!(t.body, "{\"path\":\"a.rs\"}");
            }
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn parses_a_delegation_block() {
        let text = "<<<agent.reviewer\nplease review this\n>>>";
        let blocks = parse_blocks(text);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Delegation(d) => {
                assert_eq!(d.agent_id, "reviewer");
                assert_eq!(d.prompt, "please review this");
            }
            _ => panic!("expected delegation block"),
        }
    }

    #[test]
    fn tool_name_matching_is_case_insensitive() {
        let text = "<<<TOOL.Grep\npattern\n>>>";
        let blocks = parse_blocks(text);
        match &blocks[0] {
            Block::Tool(t) => assert_eq!(t.name, "grep"),
            _ => panic!("expected tool block"),
        }
    }

    #[test]
    fn parses_multiple_blocks_in_order() {
        let text = "<<<tool.read\na\n>>>\nmiddle\n<<<agent.worker\nb\n>>>";
        let blocks = parse_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0], Block::Tool(_)));
        assert!(matches!(blocks[1], Block::Delegation(_)));
    }

    #[test]
    fn strip_blocks_removes_all_directives() {
        let text = "before\n<<<tool.read\na\n>>>\nafter";
        assert_eq!(strip_blocks(text), "before\n\n\nafter".trim());
    }

    #[test]
    fn no_blocks_returns_empty_vec() {
        assert!(parse_blocks("just plain text, nothing fenced").is_empty());
    }

    #[test]
    fn strip_delegation_blocks_keeps_tool_blocks() {
        let text = "<<<tool.read\na\n>>>\n<<<agent.worker\nb\n>>>";
        let stripped = strip_delegation_blocks(text);
        assert!(stripped.contains("<<<tool.read"));
        assert!(!stripped.contains("<<<agent.worker"));
    }
}
