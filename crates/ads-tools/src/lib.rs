// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod command;
pub mod policy;
pub mod registry;
pub mod tool;

pub use command::{run_command, CommandError, CommandRequest, CommandResult};
pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput, ToolOutputPart};

pub use builtin::agent::{AgentInvoker, AgentTool};
pub use builtin::apply_patch::ApplyPatchTool;
pub use builtin::exec::ExecTool;
pub use builtin::find::FindTool;
pub use builtin::grep::GrepTool;
pub use builtin::read::ReadTool;
pub use builtin::search::SearchTool;
pub use builtin::vsearch::{chunk_text, HistoryRow, VectorIndexStore, VsearchTool};
pub use builtin::write::WriteTool;
