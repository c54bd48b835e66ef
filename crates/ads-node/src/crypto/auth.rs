// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Admin password hashing and session token generation/storage.
//!
//! # Security model
//!
//! The admin password is hashed with scrypt and only the hash is persisted
//! in the credentials file. Session tokens follow the same shape the old
//! bearer-token scheme used: the raw token is shown to the caller exactly
//! once (in the `ads_session` cookie), and only its SHA-256 digest is stored
//! server-side. If either file leaks, the attacker gets a hash, not a
//! usable secret.
//!
//! All comparisons use [`subtle::ConstantTimeEq`] to prevent timing oracles.
//!
//! # Usage
//!
//! ```rust
//! use ads_node::crypto::auth::{PasswordHash, SessionToken};
//!
//! let hash = PasswordHash::hash("correct horse battery staple").unwrap();
//! assert!(hash.verify("correct horse battery staple"));
//! assert!(!hash.verify("wrong password"));
//!
//! let raw = SessionToken::generate();
//! let stored = raw.clone().into_stored();
//! assert!(stored.verify(raw.as_str()));
//! ```

use std::path::Path;

use anyhow::Context;
use rand::rngs::OsRng;
use rand::RngCore;
use scrypt::Params;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// scrypt cost parameters: N=2^15, r=8, p=1. Tuned so a single verification
/// takes tens of milliseconds on commodity hardware — slow enough to make
/// offline brute force expensive, fast enough not to stall the login
/// endpoint.
fn scrypt_params() -> Params {
    Params::new(15, 8, 1, 32).expect("static scrypt params are valid")
}

/// A scrypt password hash, encoded as `log_n$r$p$salt_hex$hash_hex`.
///
/// This hand-rolled encoding (rather than the PHC string format) keeps the
/// dependency surface to the `scrypt` crate's core `scrypt()` function,
/// which has been stable across the crate's 0.x releases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash `password` with a freshly generated random salt.
    pub fn hash(password: &str) -> anyhow::Result<Self> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let params = scrypt_params();
        let mut out = [0u8; 32];
        scrypt::scrypt(password.as_bytes(), &salt, &params, &mut out)
            .map_err(|e| anyhow::anyhow!("scrypt hashing failed: {e}"))?;
        Ok(PasswordHash(format!(
            "{}${}${}${}${}",
            params.log_n(),
            params.r(),
            params.p(),
            hex::encode(salt),
            hex::encode(out)
        )))
    }

    /// The encoded `log_n$r$p$salt_hex$hash_hex` string, for mirroring into
    /// storage that only needs an opaque per-user credential marker.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify `password` against this hash in constant time.
    pub fn verify(&self, password: &str) -> bool {
        let Some(parsed) = Self::parse(&self.0) else {
            return false;
        };
        let (log_n, r, p, salt, expected) = parsed;
        let Ok(params) = Params::new(log_n, r, p, 32) else {
            return false;
        };
        let mut out = [0u8; 32];
        if scrypt::scrypt(password.as_bytes(), &salt, &params, &mut out).is_err() {
            return false;
        }
        bool::from(out.ct_eq(&expected[..]))
    }

    fn parse(s: &str) -> Option<(u8, u32, u32, Vec<u8>, Vec<u8>)> {
        let mut parts = s.split('$');
        let log_n: u8 = parts.next()?.parse().ok()?;
        let r: u32 = parts.next()?.parse().ok()?;
        let p: u32 = parts.next()?.parse().ok()?;
        let salt = hex::decode(parts.next()?).ok()?;
        let hash = hex::decode(parts.next()?).ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((log_n, r, p, salt, hash))
    }
}

/// A raw session token — shown to the client **exactly once**, inside the
/// `ads_session` cookie value. Call [`SessionToken::into_stored`] to get the
/// digest to persist; the raw value itself is never written to disk.
#[derive(Debug, Clone)]
#[must_use = "send this token to the client, then call into_stored()"]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a cryptographically random 256-bit session token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        SessionToken(base64url_encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_stored(self) -> StoredSessionToken {
        StoredSessionToken(sha256(self.0.as_bytes()))
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The stored form of a session token — only the SHA-256 digest is
/// persisted, keyed by session id in the workspace database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSessionToken(#[serde(with = "hex_bytes")] [u8; 32]);

impl StoredSessionToken {
    /// Hash a raw token value directly, for looking a presented cookie up by
    /// its digest rather than comparing against a stored raw value.
    pub fn hash_raw(raw: &str) -> Self {
        StoredSessionToken(sha256(raw.as_bytes()))
    }

    /// Verify a provided token string in constant time.
    pub fn verify(&self, provided: &str) -> bool {
        let provided_hash = sha256(provided.as_bytes());
        bool::from(provided_hash.ct_eq(&self.0))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(hex_str)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("wrong length"))?;
        Ok(StoredSessionToken(arr))
    }
}

/// On-disk YAML format for the admin credentials file.
///
/// Example `~/.config/ads/credentials.yaml`:
/// ```yaml
/// username: admin
/// password_hash: "15$8$1$...$..."
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsFile {
    pub username: String,
    pub password_hash: PasswordHash,
}

impl CredentialsFile {
    /// Create the admin credentials file, overwriting any existing one.
    /// Used by `ads init-admin` and `ads reset-admin`.
    pub fn create(path: &Path, username: &str, password: &str) -> anyhow::Result<Self> {
        let password_hash = PasswordHash::hash(password)?;
        let file = CredentialsFile { username: username.to_string(), password_hash };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating credentials directory {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(&file).context("serializing credentials file")?;
        write_secret_file(path, yaml.as_bytes())?;
        Ok(file)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading credentials file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing credentials file {}", path.display()))
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Verify a login attempt in constant time on the username comparison
    /// too, so a wrong username doesn't short-circuit before the (much
    /// slower) password check — avoiding a timing channel that would let an
    /// attacker enumerate valid usernames.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = bool::from(self.username.as_bytes().ct_eq(username.as_bytes()));
        let password_ok = self.password_hash.verify(password);
        username_ok & password_ok
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Write `data` to `path` with mode 0o600 on Unix (owner-read/write only).
fn write_secret_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("writing secret file {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)
            .with_context(|| format!("writing secret file {}", path.display()))?;
    }
    Ok(())
}

fn base64url_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Serde helper: serialize/deserialize a `[u8; 32]` as a lowercase hex string.
mod hex_bytes {
    use serde::{de::Error, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes.try_into().map_err(|_| D::Error::custom("expected 32-byte hex"))
    }

    use serde::Deserialize;
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_correct_password() {
        let h = PasswordHash::hash("correct horse battery staple").unwrap();
        assert!(h.verify("correct horse battery staple"));
    }

    #[test]
    fn password_hash_rejects_wrong_password() {
        let h = PasswordHash::hash("correct horse battery staple").unwrap();
        assert!(!h.verify("wrong"));
    }

    #[test]
    fn password_hash_yaml_round_trip() {
        let h = PasswordHash::hash("hunter2").unwrap();
        let yaml = serde_yaml::to_string(&h).unwrap();
        let back: PasswordHash = serde_yaml::from_str(&yaml).unwrap();
        assert!(back.verify("hunter2"));
    }

    #[test]
    fn generated_session_token_is_43_chars() {
        let t = SessionToken::generate();
        assert_eq!(t.as_str().len(), 43, "token must be 43 base64url chars");
    }

    #[test]
    fn stored_session_token_verifies_correct_raw() {
        let raw = SessionToken::generate();
        let raw_str = raw.as_str().to_string();
        let stored = raw.into_stored();
        assert!(stored.verify(&raw_str));
    }

    #[test]
    fn stored_session_token_rejects_wrong_value() {
        let raw = SessionToken::generate();
        let stored = raw.into_stored();
        assert!(!stored.verify("wrong-token"));
    }

    #[test]
    fn two_generated_session_tokens_are_different() {
        let t1 = SessionToken::generate().into_stored();
        let t2 = SessionToken::generate().into_stored();
        assert_ne!(t1.to_hex(), t2.to_hex());
    }

    #[test]
    fn credentials_file_create_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        CredentialsFile::create(&path, "admin", "s3cret").unwrap();
        let loaded = CredentialsFile::load(&path).unwrap();
        assert!(loaded.verify("admin", "s3cret"));
        assert!(!loaded.verify("admin", "wrong"));
        assert!(!loaded.verify("nope", "s3cret"));
    }
}
