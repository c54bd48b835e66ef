// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Prompt Store (spec.md §3): per-user named prompt snippets.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub user_id: String,
    pub prompt_id: String,
    pub name: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_prompt(r: &rusqlite::Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        user_id: r.get(0)?,
        prompt_id: r.get(1)?,
        name: r.get(2)?,
        content: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}

const PROMPT_COLUMNS: &str = "user_id, prompt_id, name, content, created_at, updated_at";

pub fn create(
    conn: &Connection,
    user_id: &str,
    prompt_id: &str,
    name: &str,
    content: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Prompt> {
    let now_str = now.to_rfc3339();
    conn.execute(
        "INSERT INTO prompts (user_id, prompt_id, name, content, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![user_id, prompt_id, name, content, now_str],
    )?;
    get(conn, user_id, prompt_id)?.ok_or_else(|| crate::error::StorageError::NotFound(prompt_id.to_string()))
}

pub fn get(conn: &Connection, user_id: &str, prompt_id: &str) -> Result<Option<Prompt>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE user_id = ?1 AND prompt_id = ?2"),
            params![user_id, prompt_id],
            row_to_prompt,
        )
        .optional()?)
}

pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<Prompt>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE user_id = ?1 ORDER BY updated_at DESC"))?;
    let rows = stmt
        .query_map(params![user_id], row_to_prompt)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, user_id: &str, prompt_id: &str) -> Result<bool> {
    let deleted =
        conn.execute("DELETE FROM prompts WHERE user_id = ?1 AND prompt_id = ?2", params![user_id, prompt_id])?;
    Ok(deleted == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlobalDb;

    #[test]
    fn create_then_list_round_trips() {
        let db = GlobalDb::open_in_memory().unwrap();
        create(db.conn(), "u1", "pr1", "greeting", "hello there", chrono::Utc::now()).unwrap();
        let all = list(db.conn(), "u1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "greeting");
    }
}
