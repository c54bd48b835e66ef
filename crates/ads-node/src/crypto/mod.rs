// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod auth;

pub use auth::{CredentialsFile, PasswordHash, SessionToken, StoredSessionToken};
