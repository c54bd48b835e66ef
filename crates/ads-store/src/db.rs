// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`WorkspaceDb`] — a single SQLite connection scoped to one workspace's
//! `.ads/state.db`, shared by the History Store, Task Store/Queue, Thread
//! Storage, and Vector KV. Writers are serialized by the caller via the
//! Workspace Lock Pool (`crate::lock_pool`); SQLite itself serializes readers
//! against the single connection.
//!
//! [`GlobalDb`] is the process-wide counterpart, opened once at
//! `~/.ads/state.db` (or `ADS_STATE_DB_PATH`), holding User/Session/
//! Project/Prompt rows per §3's ownership rule — no rows cross workspaces.

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::schema;

pub struct WorkspaceDb {
    conn: Connection,
}

impl WorkspaceDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init_workspace_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_workspace_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub struct GlobalDb {
    conn: Connection,
}

impl GlobalDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::init_global_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_global_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_db_with_schema() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        let version: i32 = db
            .conn()
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn opens_file_backed_db_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let db = WorkspaceDb::open(&path).unwrap();
        assert!(path.exists());
        drop(db);
    }

    #[test]
    fn global_db_opens_in_memory_with_its_own_schema() {
        let db = GlobalDb::open_in_memory().unwrap();
        let version: i32 = db
            .conn()
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }
}
