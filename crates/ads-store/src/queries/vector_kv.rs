// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Vector KV (spec.md §4.O): per-`(namespace, key)` indexing cursors and
//! content hashes used by the preflight indexer to skip unchanged chunks.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorKvEntry {
    pub namespace: String,
    pub key: String,
    pub content_hash: Option<String>,
    pub last_id: i64,
    pub metadata: Option<String>,
}

pub fn get(conn: &Connection, namespace: &str, key: &str) -> Result<Option<VectorKvEntry>> {
    Ok(conn
        .query_row(
            "SELECT namespace, key, content_hash, last_id, metadata FROM vector_kv \
             WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |r| {
                Ok(VectorKvEntry {
                    namespace: r.get(0)?,
                    key: r.get(1)?,
                    content_hash: r.get(2)?,
                    last_id: r.get(3)?,
                    metadata: r.get(4)?,
                })
            },
        )
        .optional()?)
}

/// Upsert a file-chunk entry keyed by `content_hash` (used by the
/// `docs/**` preflight indexer to skip unchanged files).
pub fn upsert_content_hash(conn: &Connection, namespace: &str, key: &str, content_hash: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO vector_kv (namespace, key, content_hash, last_id, metadata) \
         VALUES (?1, ?2, ?3, 0, NULL) \
         ON CONFLICT(namespace, key) DO UPDATE SET content_hash = ?3",
        params![namespace, key, content_hash],
    )?;
    Ok(())
}

/// Advance the row-id cursor for a `(namespace, session)` history scan.
pub fn advance_cursor(conn: &Connection, namespace: &str, key: &str, last_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO vector_kv (namespace, key, content_hash, last_id, metadata) \
         VALUES (?1, ?2, NULL, ?3, NULL) \
         ON CONFLICT(namespace, key) DO UPDATE SET last_id = ?3",
        params![namespace, key, last_id],
    )?;
    Ok(())
}
