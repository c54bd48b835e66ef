// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Storage-layer error type. Converts into the host-wide `StorageError` kind
//! at the boundary into the orchestration layer.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl ads_core::IntoErrorKind for StorageError {
    fn error_kind(&self) -> ads_core::ErrorKind {
        ads_core::ErrorKind::Storage
    }
}
