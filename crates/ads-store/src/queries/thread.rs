// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Thread Storage (spec.md §4.K): peppered user-id hashing and multi-agent
//! thread-id persistence.
//!
//! `thread_id` is either a raw opaque string (single-agent/legacy) or a JSON
//! object `{agentId: threadId}` (multi-agent); empty values are omitted on
//! serialize.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::Result;

const SALT_KV_KEY: &str = "thread_storage_salt";
const SALT_WORKSPACE: &str = "__global__";

/// Load the peppering salt, generating and persisting one on first use.
pub fn get_or_create_salt(conn: &Connection) -> Result<String> {
    if let Some(existing) = super::kv::get(conn, SALT_WORKSPACE, SALT_KV_KEY)? {
        return Ok(existing);
    }
    let salt = uuid::Uuid::new_v4().to_string();
    super::kv::set(conn, SALT_WORKSPACE, SALT_KV_KEY, &salt)?;
    Ok(salt)
}

pub fn user_hash(user_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Thread ids for one or more agents. Serializes as a raw string when exactly
/// one legacy (unnamed) entry is present, otherwise as a JSON object with
/// empty values omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadIds(pub BTreeMap<String, String>);

const LEGACY_KEY: &str = "__legacy__";

impl ThreadIds {
    pub fn single(thread_id: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(LEGACY_KEY.to_string(), thread_id.into());
        Self(map)
    }

    pub fn get(&self, agent_id: &str) -> Option<&str> {
        self.0.get(agent_id).map(|s| s.as_str()).or_else(|| {
            if self.0.len() == 1 {
                self.0.get(LEGACY_KEY).map(|s| s.as_str())
            } else {
                None
            }
        })
    }

    pub fn set(&mut self, agent_id: &str, thread_id: String) {
        self.0.remove(LEGACY_KEY);
        self.0.insert(agent_id.to_string(), thread_id);
    }

    pub fn serialize(&self) -> String {
        let non_empty: BTreeMap<&String, &String> =
            self.0.iter().filter(|(_, v)| !v.is_empty()).collect();
        if non_empty.len() == 1 {
            if let Some((k, v)) = non_empty.iter().next() {
                if k.as_str() == LEGACY_KEY {
                    return (*v).clone();
                }
            }
        }
        serde_json::to_string(&non_empty).unwrap_or_default()
    }

    pub fn parse(raw: &str) -> Self {
        if let Ok(map) = serde_json::from_str::<BTreeMap<String, String>>(raw) {
            Self(map)
        } else {
            Self::single(raw)
        }
    }
}

/// `(namespace, user_hash)` is the unique key per §3 invariant 4; `cwd` is
/// an optional hint restored alongside the thread ids on resume.
pub fn get_thread_ids(conn: &Connection, namespace: &str, user_hash: &str) -> Result<Option<ThreadIds>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT thread_id FROM thread_state WHERE namespace = ?1 AND user_hash = ?2",
            params![namespace, user_hash],
            |r| r.get(0),
        )
        .optional()?;
    Ok(raw.map(|r| ThreadIds::parse(&r)))
}

pub fn get_cwd(conn: &Connection, namespace: &str, user_hash: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT cwd FROM thread_state WHERE namespace = ?1 AND user_hash = ?2",
            params![namespace, user_hash],
            |r| r.get(0),
        )
        .optional()?
        .flatten())
}

/// Upsert keyed on `(namespace, user_hash)`, per §3 invariant 4.
pub fn save_thread_ids(
    conn: &Connection,
    namespace: &str,
    user_hash: &str,
    ids: &ThreadIds,
    cwd: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO thread_state (namespace, user_hash, thread_id, cwd, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(namespace, user_hash) DO UPDATE SET thread_id = ?3, cwd = COALESCE(?4, thread_state.cwd), updated_at = ?5",
        params![namespace, user_hash, ids.serialize(), cwd, now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkspaceDb;

    #[test]
    fn salt_is_generated_once_and_stable() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        let s1 = get_or_create_salt(db.conn()).unwrap();
        let s2 = get_or_create_salt(db.conn()).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn user_hash_is_deterministic_and_salt_dependent() {
        let a = user_hash("user-1", "salt-a");
        let b = user_hash("user-1", "salt-a");
        let c = user_hash("user-1", "salt-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn single_agent_thread_ids_round_trip_as_raw_string() {
        let ids = ThreadIds::single("thread-xyz");
        let raw = ids.serialize();
        assert_eq!(raw, "thread-xyz");
        let parsed = ThreadIds::parse(&raw);
        assert_eq!(parsed.get("anything"), Some("thread-xyz"));
    }

    #[test]
    fn multi_agent_thread_ids_round_trip_as_json_without_loss() {
        let mut ids = ThreadIds::default();
        ids.set("codex", "abc".to_string());
        ids.set("claude", "def".to_string());
        let raw = ids.serialize();
        let parsed = ThreadIds::parse(&raw);
        assert_eq!(parsed.get("codex"), Some("abc"));
        assert_eq!(parsed.get("claude"), Some("def"));
    }

    #[test]
    fn empty_thread_id_values_are_omitted_on_serialize() {
        let mut ids = ThreadIds::default();
        ids.set("codex", "abc".to_string());
        ids.set("gemini", String::new());
        let raw = ids.serialize();
        assert!(!raw.contains("gemini"));
    }

    #[test]
    fn save_then_get_round_trips_through_storage() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        let mut ids = ThreadIds::default();
        ids.set("codex", "abc".to_string());
        save_thread_ids(db.conn(), "agent", "hash1", &ids, Some("/tmp/ws")).unwrap();
        let loaded = get_thread_ids(db.conn(), "agent", "hash1").unwrap().unwrap();
        assert_eq!(loaded.get("codex"), Some("abc"));
        assert_eq!(get_cwd(db.conn(), "agent", "hash1").unwrap(), Some("/tmp/ws".to_string()));
    }

    #[test]
    fn distinct_namespaces_with_the_same_user_hash_are_independent() {
        let db = WorkspaceDb::open_in_memory().unwrap();
        save_thread_ids(db.conn(), "ns-a", "hash1", &ThreadIds::single("t-a"), None).unwrap();
        save_thread_ids(db.conn(), "ns-b", "hash1", &ThreadIds::single("t-b"), None).unwrap();
        assert_eq!(get_thread_ids(db.conn(), "ns-a", "hash1").unwrap().unwrap().get("x"), Some("t-a"));
        assert_eq!(get_thread_ids(db.conn(), "ns-b", "hash1").unwrap().unwrap().get("x"), Some("t-b"));
    }
}
