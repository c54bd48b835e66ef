// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;

use ads_config::AgentMode;

/// Optional contextual blocks injected into the system prompt.
#[derive(Debug, Default)]
pub struct PromptContext<'a> {
    /// Absolute path to the project root (from `.git` detection).
    pub project_root: Option<&'a Path>,
    /// Text appended verbatim after the default Guidelines section.
    pub append: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    /// Returns a copy of this context. Kept for symmetry with the volatile
    /// git/CI-aware prompt contexts other repos build — there is no volatile
    /// field here, so this is just a clone.
    pub fn stable_only(&self) -> Self {
        Self { project_root: self.project_root, append: self.append }
    }
}

mod guidelines {
    pub fn general() -> &'static str {
        "- Be concise and precise. Use tools instead of guessing.\n\
         - Prefer the narrowest tool for the job: `grep`/`find` to locate, `read` to inspect, \
           `write`/`apply_patch` to change."
    }

    pub fn tool_usage() -> &'static str {
        "- NEVER shell out via `exec` for file I/O — use `read`/`write`/`apply_patch`/`grep`/`find`.\n\
         - Discovery workflow: `find` to locate files by name/glob → `grep` to narrow by content → \
           `read` for full context.\n\
         - Use `search` for open-web lookups and `vsearch` for semantic lookups inside the workspace; \
           they are not interchangeable.\n\
         - Prefer `apply_patch` over `write` when modifying an existing file — it preserves \
           surrounding context and fails loudly on a stale hunk."
    }

    pub fn code_quality() -> &'static str {
        "- Keep changes scoped to what was asked; do not refactor unrelated code.\n\
         - NEVER create new files proactively unless explicitly requested.\n\
         - Preserve existing code structure and style."
    }

    pub fn error_handling() -> &'static str {
        "- When a tool fails, read the error and try a different approach rather than repeating \
           the same call.\n\
         - `exec` commands that depend on location must set an explicit working directory."
    }
}

/// Describes one tool for the `<<<tool.NAME>>>` protocol block injected into
/// the system prompt.
pub struct ToolGuideEntry {
    pub name: String,
    pub description: String,
}

/// Describes one registered agent for the delegation protocol block.
pub struct AgentGuideEntry {
    pub id: String,
    pub name: String,
}

/// Build the preamble that teaches a model the `<<<tool.NAME>>>` /
/// `<<<agent.ID>>>` fenced-block protocol, listing the tools and
/// delegation targets actually available this turn.
///
/// Injected once per turn ahead of the user's input (not cached as part of
/// the stable system prompt) because the available agent roster can change
/// between turns as agents are registered.
pub fn tool_and_delegation_guide(tools: &[ToolGuideEntry], agents: &[AgentGuideEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        "To call a tool, write a fenced block anywhere in your response:\n\n\
         <<<tool.NAME\n\
         { ...JSON arguments... }\n\
         >>>\n\n\
         The result is fed back to you and you may call more tools before responding.\n",
    );
    if !tools.is_empty() {
        out.push_str("\nAvailable tools:\n");
        for t in tools {
            out.push_str(&format!("- `{}`: {}\n", t.name, t.description));
        }
    }
    if !agents.is_empty() {
        out.push_str(
            "\nTo delegate a sub-task to another agent, write:\n\n\
             <<<agent.ID\n\
             ...prompt for that agent...\n\
             >>>\n\n\
             Available agents:\n",
        );
        for a in agents {
            out.push_str(&format!("- `{}` ({})\n", a.id, a.name));
        }
    }
    out
}

/// Build the system prompt for `mode`, optionally replaced wholesale by
/// `custom`, with `ctx`'s fields appended.
pub fn system_prompt(mode: AgentMode, custom: Option<&str>, ctx: PromptContext<'_>) -> String {
    if let Some(c) = custom {
        return c.to_string();
    }

    let mut sections = vec![guidelines::general().to_string(), guidelines::tool_usage().to_string()];

    match mode {
        AgentMode::Research => {
            sections.push(
                "You are in Research mode: investigate and report findings. \
                 Do not modify files."
                    .to_string(),
            );
        }
        AgentMode::Plan => {
            sections.push(
                "You are in Plan mode: produce a concrete plan before any change is made. \
                 Do not modify files."
                    .to_string(),
            );
            sections.push(guidelines::code_quality().to_string());
        }
        AgentMode::Agent => {
            sections.push(guidelines::code_quality().to_string());
            sections.push(guidelines::error_handling().to_string());
        }
    }

    if let Some(root) = ctx.project_root {
        sections.push(format!("Project root: {}", root.display()));
    }

    if let Some(append) = ctx.append {
        sections.push(append.to_string());
    }

    format!("# Guidelines\n\n{}", sections.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty<'a>() -> PromptContext<'a> {
        PromptContext::default()
    }

    #[test]
    fn custom_prompt_overrides_everything() {
        let prompt = system_prompt(AgentMode::Agent, Some("Custom instructions."), empty());
        assert_eq!(prompt, "Custom instructions.");
    }

    #[test]
    fn research_mode_mentions_no_modification() {
        let prompt = system_prompt(AgentMode::Research, None, empty());
        assert!(prompt.contains("Research mode"));
        assert!(prompt.contains("Do not modify"));
    }

    #[test]
    fn plan_mode_mentions_plan() {
        let prompt = system_prompt(AgentMode::Plan, None, empty());
        assert!(prompt.contains("Plan mode"));
    }

    #[test]
    fn agent_mode_includes_code_quality_and_error_handling() {
        let prompt = system_prompt(AgentMode::Agent, None, empty());
        assert!(prompt.contains("Keep changes scoped"));
        assert!(prompt.contains("try a different approach"));
    }

    #[test]
    fn project_root_is_appended() {
        let ctx = PromptContext { project_root: Some(Path::new("/workspace")), append: None };
        let prompt = system_prompt(AgentMode::Agent, None, ctx);
        assert!(prompt.contains("/workspace"));
    }

    #[test]
    fn append_text_is_included() {
        let ctx = PromptContext { project_root: None, append: Some("Extra note.") };
        let prompt = system_prompt(AgentMode::Agent, None, ctx);
        assert!(prompt.contains("Extra note."));
    }

    #[test]
    fn stable_only_preserves_fields() {
        let ctx = PromptContext { project_root: Some(Path::new("/p")), append: Some("a") };
        let stable = ctx.stable_only();
        assert_eq!(stable.project_root, Some(Path::new("/p")));
        assert_eq!(stable.append, Some("a"));
    }

    #[test]
    fn tool_guide_lists_tool_names() {
        let tools = vec![ToolGuideEntry { name: "read".into(), description: "Read a file".into() }];
        let guide = tool_and_delegation_guide(&tools, &[]);
        assert!(guide.contains("<<<tool.NAME"));
        assert!(guide.contains("`read`: Read a file"));
        assert!(!guide.contains("<<<agent.ID"));
    }

    #[test]
    fn tool_guide_lists_agents_when_present() {
        let agents = vec![AgentGuideEntry { id: "reviewer".into(), name: "Reviewer".into() }];
        let guide = tool_and_delegation_guide(&[], &agents);
        assert!(guide.contains("<<<agent.ID"));
        assert!(guide.contains("`reviewer` (Reviewer)"));
    }

    #[test]
    fn tool_guide_empty_when_no_tools_or_agents() {
        let guide = tool_and_delegation_guide(&[], &[]);
        assert!(!guide.contains("Available tools"));
        assert!(!guide.contains("Available agents"));
    }
}
