// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

/// `ads` — agent orchestration & task-queue runtime.
#[derive(Parser, Debug)]
#[command(name = "ads", version, about = "Multi-agent orchestration runtime with a WebSocket/HTTP front")]
pub struct Cli {
    /// Path to the agent config file (model/agent/tools/workspace/queue/
    /// vector_context). Defaults to the standard search path.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the admin credentials file used by `ads serve`'s login
    /// endpoint. Fails (exit 1) if one already exists — use `reset-admin`
    /// to overwrite.
    InitAdmin {
        /// Admin username.
        #[arg(long)]
        username: String,
        /// Admin password. If omitted, read from the ADS_ADMIN_PASSWORD
        /// environment variable.
        #[arg(long)]
        password: Option<String>,
        /// Path to the credentials file. Defaults to the node config's
        /// `auth.credentials_file`, or `~/.config/ads/credentials.yaml`.
        #[arg(long)]
        credentials_file: Option<PathBuf>,
        /// Path to the node config file.
        #[arg(long, short = 'n')]
        node_config: Option<PathBuf>,
    },

    /// Overwrite the admin credentials file with a new username/password.
    ResetAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        credentials_file: Option<PathBuf>,
        #[arg(long, short = 'n')]
        node_config: Option<PathBuf>,
    },

    /// Start the WebSocket/HTTP front for a workspace. Blocks until shutdown.
    Serve {
        /// Workspace root. Its `.ads/state.db` is opened (or created).
        #[arg(long, short = 'w', default_value = ".")]
        workspace: PathBuf,
        /// Path to the node config file.
        #[arg(long, short = 'n')]
        node_config: Option<PathBuf>,
    },

    /// Task queue utilities for a workspace — usable without a running node.
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks queued or run in a workspace.
    List {
        #[arg(long, short = 'w', default_value = ".")]
        workspace: PathBuf,
        /// Only show tasks in this status (queued, pending, planning,
        /// running, completed, failed, cancelled).
        #[arg(long)]
        status: Option<String>,
    },

    /// Queue a new task for a workspace.
    Create {
        /// Prompt text the task runs with.
        input: String,
        #[arg(long, short = 'w', default_value = ".")]
        workspace: PathBuf,
        #[arg(long)]
        max_retries: Option<i64>,
    },

    /// Request a single-task run, arming the Run Controller's `single` mode.
    Run {
        id: String,
        #[arg(long, short = 'w', default_value = ".")]
        workspace: PathBuf,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ads", &mut std::io::stdout());
}
