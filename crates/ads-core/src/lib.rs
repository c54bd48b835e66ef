// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Error *kinds*, not types: the vocabulary every crate's concrete
//! `thiserror` enum converts into at the boundary where it crosses into the
//! orchestration layer, so the Task Queue and WebSocket Front can dispatch on
//! kind without downcasting concrete error types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Cancellation. Never retried at the Task Queue.
    Abort,
    /// Missing config key, disabled feature, wrong env.
    Config,
    /// Malformed payload, path outside allowlist, empty prompt.
    Input,
    /// Missing/expired session, scrypt mismatch (compared constant-time).
    Auth,
    /// Caller is over quota.
    RateLimit,
    /// A tool call failed; contained at the registry, turn continues.
    Tool,
    /// Agent vendor HTTP/stream error. Retryable at the Task Queue only.
    Upstream,
    /// SQLite unique/foreign-key/IO failure. Fatal to the request, not the process.
    Storage,
}

impl ErrorKind {
    /// `AbortError` is the only kind the Task Queue must never retry;
    /// `UpstreamError` is the only kind it may.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Upstream)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Abort => "AbortError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Input => "InputError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::RateLimit => "RateLimitError",
            ErrorKind::Tool => "ToolError",
            ErrorKind::Upstream => "UpstreamError",
            ErrorKind::Storage => "StorageError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kinded error carrying a user-facing message, the shape every crate
/// boundary converts its concrete error into before handing it to the
/// history writer (`kind:"error"` rows) or the WebSocket error frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl KindedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl std::fmt::Display for KindedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for KindedError {}

/// Implemented by each crate's concrete error enum to declare which
/// [`ErrorKind`] it maps to at the orchestration boundary.
pub trait IntoErrorKind {
    fn error_kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_errors_are_retryable() {
        for kind in [
            ErrorKind::Abort,
            ErrorKind::Config,
            ErrorKind::Input,
            ErrorKind::Auth,
            ErrorKind::RateLimit,
            ErrorKind::Tool,
            ErrorKind::Storage,
        ] {
            assert!(!kind.is_retryable());
        }
        assert!(ErrorKind::Upstream.is_retryable());
    }

    #[test]
    fn kinded_error_display_includes_kind_and_message() {
        let err = KindedError::new(ErrorKind::Auth, "session expired");
        assert_eq!(err.to_string(), "AuthError: session expired");
    }
}
