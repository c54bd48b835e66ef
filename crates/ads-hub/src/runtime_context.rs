// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context for an orchestrator session.
//!
//! Separate from [`ads_config::AgentConfig`], which holds only config-file
//! fields: this carries values detected or specified at construction time
//! (project root, prompt overrides).

use std::path::{Path, PathBuf};

/// Environment-detected context injected into an [`crate::AgentHub`] turn.
#[derive(Debug, Default, Clone)]
pub struct AgentRuntimeContext {
    /// Absolute path to the project root (found via `.git` walk-up).
    pub project_root: Option<PathBuf>,
    /// Text appended to the default system prompt.
    pub append_system_prompt: Option<String>,
    /// Full system prompt override. When set, replaces the built-in prompt entirely.
    pub system_prompt_override: Option<String>,
}

impl AgentRuntimeContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walk up from `start` looking for a `.git` directory.
    pub fn detect_project_root(start: &Path) -> Option<PathBuf> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(".git").exists() {
                return Some(dir);
            }
            if !dir.pop() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_project_root_finds_git_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let found = AgentRuntimeContext::detect_project_root(&nested);
        assert_eq!(found.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn detect_project_root_returns_none_without_git() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(AgentRuntimeContext::detect_project_root(tmp.path()).is_none());
    }
}
