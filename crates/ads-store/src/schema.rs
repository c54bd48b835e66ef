// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Two schemas live in this crate: the per-workspace schema
//! ([`init_workspace_schema`], opened at `<workspace>/.ads/state.db` by
//! [`crate::WorkspaceDb`]) and the process-global schema
//! ([`init_global_schema`], opened at `~/.ads/state.db` by
//! [`crate::GlobalDb`]). A workspace owns its Task/History/Attachment/
//! VectorKV rows; the global DB owns User/Session/Project/Prompt. No rows
//! cross workspaces.
use rusqlite::Connection;

use crate::error::Result;

/// Bump when a table definition changes; `init_*_schema` drops and
/// recreates everything on a version mismatch since this is a cache-like
/// store, not a system of record that needs migrations.
pub const SCHEMA_VERSION: i32 = 2;

pub fn init_workspace_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_workspace_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role       TEXT NOT NULL,
            text       TEXT NOT NULL,
            ts         TEXT NOT NULL,
            kind       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_history_session ON history(session_id, id);
        CREATE INDEX IF NOT EXISTS idx_history_kind ON history(session_id, kind);

        CREATE TABLE IF NOT EXISTS tasks (
            id                 TEXT PRIMARY KEY,
            workspace          TEXT NOT NULL,
            status             TEXT NOT NULL,
            input              TEXT NOT NULL,
            queue_order        INTEGER NOT NULL,
            queued_at          TEXT,
            prompt_injected_at TEXT,
            retry_count        INTEGER NOT NULL DEFAULT 0,
            max_retries        INTEGER NOT NULL DEFAULT 3,
            inherit_context    INTEGER NOT NULL DEFAULT 0,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_workspace_status ON tasks(workspace, status, queue_order);

        CREATE TABLE IF NOT EXISTS task_messages (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL,
            role    TEXT NOT NULL,
            text    TEXT NOT NULL,
            ts      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_task_messages_task ON task_messages(task_id, id);

        CREATE TABLE IF NOT EXISTS task_contexts (
            task_id      TEXT NOT NULL,
            context_type TEXT NOT NULL,
            content      TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            PRIMARY KEY (task_id, context_type)
        );

        CREATE TABLE IF NOT EXISTS task_bundle_drafts (
            id                TEXT PRIMARY KEY,
            draft_tasks       TEXT NOT NULL,
            created_task_ids  TEXT,
            created_at        TEXT NOT NULL,
            approved_at       TEXT
        );

        CREATE TABLE IF NOT EXISTS attachments (
            id           TEXT PRIMARY KEY,
            task_id      TEXT,
            sha256       TEXT NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes   INTEGER NOT NULL,
            width        INTEGER,
            height       INTEGER,
            filename     TEXT,
            storage_url  TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_attachments_task ON attachments(task_id);

        CREATE TABLE IF NOT EXISTS thread_state (
            namespace  TEXT NOT NULL,
            user_hash  TEXT NOT NULL,
            thread_id  TEXT NOT NULL,
            cwd        TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (namespace, user_hash)
        );

        CREATE TABLE IF NOT EXISTS kv (
            workspace TEXT NOT NULL,
            key       TEXT NOT NULL,
            value     TEXT NOT NULL,
            PRIMARY KEY (workspace, key)
        );

        CREATE TABLE IF NOT EXISTS vector_kv (
            namespace    TEXT NOT NULL,
            key          TEXT NOT NULL,
            content_hash TEXT,
            last_id      INTEGER NOT NULL DEFAULT 0,
            metadata     TEXT,
            PRIMARY KEY (namespace, key)
        );
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
    Ok(())
}

fn drop_all_workspace_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS history;
        DROP TABLE IF EXISTS tasks;
        DROP TABLE IF EXISTS task_messages;
        DROP TABLE IF EXISTS task_contexts;
        DROP TABLE IF EXISTS task_bundle_drafts;
        DROP TABLE IF EXISTS attachments;
        DROP TABLE IF EXISTS thread_state;
        DROP TABLE IF EXISTS kv;
        DROP TABLE IF EXISTS vector_kv;
        "#,
    )?;
    Ok(())
}

/// Global (process-wide) schema: User/Session/Project/Prompt, per §3's
/// ownership rule. Opened once at `~/.ads/state.db` (or `ADS_STATE_DB_PATH`).
pub fn init_global_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != 0 && current_version != SCHEMA_VERSION {
        drop_all_global_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            disabled_at   TEXT
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            token_hash    TEXT NOT NULL UNIQUE,
            created_at    TEXT NOT NULL,
            expires_at    TEXT NOT NULL,
            revoked_at    TEXT,
            last_seen_at  TEXT NOT NULL,
            last_seen_ip  TEXT,
            user_agent    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_token_hash ON sessions(token_hash);
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

        CREATE TABLE IF NOT EXISTS projects (
            user_id         TEXT NOT NULL,
            project_id      TEXT NOT NULL,
            workspace_root  TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            chat_session_id TEXT,
            sort_order      INTEGER NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            PRIMARY KEY (user_id, project_id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_user_workspace
            ON projects(user_id, workspace_root);
        CREATE INDEX IF NOT EXISTS idx_projects_user_sort ON projects(user_id, sort_order);

        CREATE TABLE IF NOT EXISTS prompts (
            user_id    TEXT NOT NULL,
            prompt_id  TEXT NOT NULL,
            name       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, prompt_id)
        );
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
    Ok(())
}

fn drop_all_global_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS users;
        DROP TABLE IF EXISTS sessions;
        DROP TABLE IF EXISTS projects;
        DROP TABLE IF EXISTS prompts;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_workspace_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_workspace_schema(&conn).unwrap();
        init_workspace_schema(&conn).unwrap();
        let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn init_global_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_global_schema(&conn).unwrap();
        init_global_schema(&conn).unwrap();
        let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
