// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use ads_core::IntoErrorKind as _;
use thiserror::Error;

pub type NodeResult<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("rate limited")]
    RateLimited,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Storage(#[from] ads_store::StorageError),

    #[error(transparent)]
    Orchestrator(#[from] ads_hub::OrchestratorError),

    #[error(transparent)]
    Hub(#[from] ads_hub::HubError),
}

impl ads_core::IntoErrorKind for NodeError {
    fn error_kind(&self) -> ads_core::ErrorKind {
        match self {
            NodeError::Tls(_) | NodeError::Http(_) | NodeError::Config(_) | NodeError::Serde(_) => {
                ads_core::ErrorKind::Config
            }
            NodeError::Auth(_) | NodeError::NotAuthorized(_) => ads_core::ErrorKind::Auth,
            NodeError::RateLimited => ads_core::ErrorKind::RateLimit,
            NodeError::Storage(e) => e.error_kind(),
            NodeError::Orchestrator(e) => e.error_kind(),
            NodeError::Hub(e) => e.error_kind(),
        }
    }
}
