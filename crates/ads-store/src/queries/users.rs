// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! User Store (spec.md §3): the process-global `users` table. The node
//! still authenticates against the YAML credentials file; this table exists
//! so a `Session` row has a real `user_id` to point at.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
    pub disabled_at: Option<String>,
}

fn row_to_user(r: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: r.get(0)?,
        username: r.get(1)?,
        password_hash: r.get(2)?,
        created_at: r.get(3)?,
        updated_at: r.get(4)?,
        disabled_at: r.get(5)?,
    })
}

const USER_COLUMNS: &str = "id, username, password_hash, created_at, updated_at, disabled_at";

pub fn get_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            row_to_user,
        )
        .optional()?)
}

/// Insert `username` with `password_hash` if it doesn't already exist;
/// otherwise refresh `password_hash`/`updated_at` to mirror the credentials
/// file, which remains the source of truth. Returns the resulting row.
pub fn upsert_from_credentials(
    conn: &Connection,
    id: &str,
    username: &str,
    password_hash: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<User> {
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO users (id, username, password_hash, created_at, updated_at, disabled_at) \
         VALUES (?1, ?2, ?3, ?4, ?4, NULL) \
         ON CONFLICT(username) DO UPDATE SET password_hash = ?3, updated_at = ?4",
        params![id, username, password_hash, now_str],
    )?;
    Ok(get_by_username(conn, username)?.expect("just upserted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlobalDb;

    #[test]
    fn upsert_from_credentials_is_idempotent_by_username() {
        let db = GlobalDb::open_in_memory().unwrap();
        let now = chrono::Utc::now();
        let a = upsert_from_credentials(db.conn(), "u1", "admin", "hash-a", now).unwrap();
        let b = upsert_from_credentials(db.conn(), "u1", "admin", "hash-b", now).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.password_hash, "hash-b");
    }
}
