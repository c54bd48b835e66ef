// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use ads_node::crypto::CredentialsFile;
use cli::{Cli, Commands, TaskCommands};

/// Exit codes per the CLI surface: `0` success, `1` user error, `2` config
/// error.
const EXIT_OK: i32 = 0;
const EXIT_USER_ERROR: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

fn default_credentials_path() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config/ads/credentials.yaml")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => EXIT_OK,
        Err(CliError::User(msg)) => {
            eprintln!("error: {msg}");
            EXIT_USER_ERROR
        }
        Err(CliError::Config(msg)) => {
            eprintln!("config error: {msg}");
            EXIT_CONFIG_ERROR
        }
    };
    std::process::exit(code);
}

enum CliError {
    User(String),
    Config(String),
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::InitAdmin { username, password, credentials_file, node_config } => {
            init_admin(username, password, credentials_file, node_config, /* overwrite */ false).await
        }
        Commands::ResetAdmin { username, password, credentials_file, node_config } => {
            init_admin(username, password, credentials_file, node_config, /* overwrite */ true).await
        }
        Commands::Serve { workspace, node_config } => serve(cli.config, workspace, node_config).await,
        Commands::Task { command } => task_command(cli.config, command).await,
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
    }
}

async fn resolve_credentials_path(
    credentials_file: Option<PathBuf>,
    node_config: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    if let Some(path) = credentials_file {
        return Ok(path);
    }
    let node_cfg = ads_node::config::load(node_config.as_deref())?;
    Ok(node_cfg.auth.credentials_file.unwrap_or_else(default_credentials_path))
}

async fn init_admin(
    username: String,
    password: Option<String>,
    credentials_file: Option<PathBuf>,
    node_config: Option<PathBuf>,
    overwrite: bool,
) -> Result<(), CliError> {
    let path = resolve_credentials_path(credentials_file, node_config).await?;

    if !overwrite && CredentialsFile::exists(&path) {
        return Err(CliError::User(format!(
            "credentials file already exists at {} — use `ads reset-admin` to overwrite",
            path.display()
        )));
    }

    let password = password
        .or_else(|| std::env::var("ADS_ADMIN_PASSWORD").ok())
        .ok_or_else(|| CliError::User("pass --password or set ADS_ADMIN_PASSWORD".into()))?;
    if password.is_empty() {
        return Err(CliError::User("password must not be empty".into()));
    }

    CredentialsFile::create(&path, &username, &password).map_err(|e| CliError::Config(e.to_string()))?;
    println!("admin credentials written to {}", path.display());
    Ok(())
}

async fn serve(
    agent_config_path: Option<PathBuf>,
    workspace: PathBuf,
    node_config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let agent_config = Arc::new(ads_config::load(agent_config_path.as_deref())?);
    let node_config = ads_node::config::load(node_config_path.as_deref())?;
    let workspace_root = canonicalize_or_create(&workspace)?;

    let node = ads_node::Node::build(node_config, agent_config, workspace_root)
        .await
        .map_err(|e| CliError::Config(e.to_string()))?;
    node.run().await.map_err(|e| CliError::Config(e.to_string()))
}

fn canonicalize_or_create(path: &Path) -> Result<PathBuf, CliError> {
    std::fs::create_dir_all(path)
        .map_err(|e| CliError::User(format!("creating workspace directory {}: {e}", path.display())))?;
    std::fs::canonicalize(path)
        .map_err(|e| CliError::User(format!("resolving workspace path {}: {e}", path.display())))
}

async fn task_command(agent_config_path: Option<PathBuf>, command: TaskCommands) -> Result<(), CliError> {
    use ads_store::queries::tasks::{self, TaskFilter, TaskStatus};
    use ads_store::{RunController, TaskQueue, WorkspaceDb, WorkspaceLockPool};
    use tokio::sync::Mutex as AsyncMutex;

    match command {
        TaskCommands::List { workspace, status } => {
            let workspace_root = canonicalize_or_create(&workspace)?;
            let db = WorkspaceDb::open(&workspace_root.join(".ads").join("state.db")).map_err(|e| CliError::Config(e.to_string()))?;
            let status = status
                .map(|s| parse_task_status(&s))
                .transpose()
                .map_err(CliError::User)?;
            let filter = TaskFilter { workspace: Some(workspace_root.display().to_string()), status };
            let list = tasks::list_tasks(db.conn(), &filter).map_err(|e| CliError::Config(e.to_string()))?;
            for task in list {
                println!("{}\t{:?}\t{}", task.id, task.status, task.input);
            }
            Ok(())
        }
        TaskCommands::Create { input, workspace, max_retries } => {
            let workspace_root = canonicalize_or_create(&workspace)?;
            let agent_config = ads_config::load(agent_config_path.as_deref())?;
            let db = WorkspaceDb::open(&workspace_root.join(".ads").join("state.db")).map_err(|e| CliError::Config(e.to_string()))?;
            let id = uuid::Uuid::new_v4().to_string();
            let task = tasks::create_task(
                db.conn(),
                &id,
                &workspace_root.display().to_string(),
                &input,
                chrono::Utc::now(),
                TaskStatus::Queued,
                max_retries.unwrap_or(agent_config.queue.default_max_retries),
            )
            .map_err(|e| CliError::Config(e.to_string()))?;
            println!("created task {}", task.id);
            Ok(())
        }
        TaskCommands::Run { id, workspace } => {
            let workspace_root = canonicalize_or_create(&workspace)?;
            let agent_config = Arc::new(ads_config::load(agent_config_path.as_deref())?);
            let db = Arc::new(AsyncMutex::new(
                WorkspaceDb::open(&workspace_root.join(".ads").join("state.db")).map_err(|e| CliError::Config(e.to_string()))?,
            ));
            let sessions = Arc::new(ads_node::control::SessionManager::new(agent_config.clone(), db.clone()));
            let locks = Arc::new(WorkspaceLockPool::new());
            let executor = Arc::new(ads_node::node::HubTaskExecutor::new(sessions, workspace_root.clone()));
            let workspace_key = workspace_root.display().to_string();
            let (queue, mut events) = TaskQueue::new(
                workspace_key.clone(),
                workspace_root.clone(),
                db.clone(),
                locks,
                executor,
                agent_config.queue.retry_backoff_ms,
            );
            let queue = Arc::new(queue);
            let run_controller = RunController::new(workspace_key, db, queue.clone());

            run_controller.request_single_task_run(&id).await.map_err(|e| CliError::User(e.to_string()))?;

            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    println!("{event:?}");
                }
            });
            queue.step_once().await.map_err(|e| CliError::Config(e.to_string()))?;
            let _ = tokio::time::timeout(std::time::Duration::from_millis(200), printer).await;
            Ok(())
        }
    }
}

fn parse_task_status(s: &str) -> Result<ads_store::queries::tasks::TaskStatus, String> {
    use ads_store::queries::tasks::TaskStatus::*;
    match s {
        "pending" => Ok(Pending),
        "queued" => Ok(Queued),
        "planning" => Ok(Planning),
        "running" => Ok(Running),
        "completed" => Ok(Completed),
        "failed" => Ok(Failed),
        "cancelled" => Ok(Cancelled),
        other => Err(format!("unknown task status {other:?}")),
    }
}
