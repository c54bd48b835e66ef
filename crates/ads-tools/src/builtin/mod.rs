// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod agent;
pub mod apply_patch;
pub mod exec;
pub mod find;
pub mod grep;
pub mod read;
pub mod search;
pub mod vsearch;
pub mod write;

#[cfg(test)]
mod output_category_tests {
    use super::agent::AgentTool;
    use super::apply_patch::ApplyPatchTool;
    use super::exec::ExecTool;
    use super::find::FindTool;
    use super::grep::GrepTool;
    use super::read::ReadTool;
    use super::search::SearchTool;
    use super::vsearch::VsearchTool;
    use super::write::WriteTool;
    use crate::tool::{OutputCategory, Tool};
    use ads_config::{VectorContextConfig, WebSearchConfig};

    fn vsearch_tool() -> VsearchTool {
        VsearchTool::new(std::path::PathBuf::from("."), VectorContextConfig::default(), None)
    }

    #[test]
    fn exec_is_head_tail() {
        assert_eq!(ExecTool.output_category(), OutputCategory::HeadTail);
    }

    #[test]
    fn grep_and_search_and_vsearch_and_find_are_match_list() {
        assert_eq!(GrepTool.output_category(), OutputCategory::MatchList);
        assert_eq!(FindTool.output_category(), OutputCategory::MatchList);
        assert_eq!(SearchTool::new(WebSearchConfig::default()).output_category(), OutputCategory::MatchList);
        assert_eq!(vsearch_tool().output_category(), OutputCategory::MatchList);
    }

    #[test]
    fn read_is_file_content() {
        assert_eq!(ReadTool.output_category(), OutputCategory::FileContent);
    }

    #[test]
    fn write_apply_patch_and_agent_default_to_generic() {
        assert_eq!(WriteTool.output_category(), OutputCategory::Generic);
        assert_eq!(ApplyPatchTool.output_category(), OutputCategory::Generic);
        assert_eq!(AgentTool::new(None).output_category(), OutputCategory::Generic);
    }

    #[test]
    fn names_match_the_dispatch_table() {
        let agent_tool = AgentTool::new(None);
        let search_tool = SearchTool::new(WebSearchConfig::default());
        let vsearch = vsearch_tool();
        let names: Vec<&str> = vec![
            agent_tool.name(),
            ApplyPatchTool.name(),
            ExecTool.name(),
            FindTool.name(),
            GrepTool.name(),
            ReadTool.name(),
            search_tool.name(),
            vsearch.name(),
            WriteTool.name(),
        ];
        for expected in ["agent", "apply_patch", "exec", "find", "grep", "read", "search", "vsearch", "write"] {
            assert!(names.contains(&expected), "missing tool: {expected}");
        }
    }
}
