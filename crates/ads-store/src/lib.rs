// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod db;
mod error;
mod lock_pool;
pub mod queries;
mod queue;
mod run_controller;
mod schema;

pub use db::{GlobalDb, WorkspaceDb};
pub use error::{Result, StorageError};
pub use lock_pool::WorkspaceLockPool;
pub use queue::{QueueEvent, QueueState, TaskExecutor, TaskQueue, TaskRunOutcome};
pub use run_controller::{RunController, RunControllerError, RunMode, RunRequestOutcome};
pub use schema::SCHEMA_VERSION;
