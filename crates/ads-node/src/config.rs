// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Node configuration loaded from YAML.
//!
//! Configuration is YAML (never TOML). Layers are **deep-merged** — you can
//! override only the fields you care about in each file.
//!
//! Search order (later overrides earlier):
//! 1. `/etc/ads/node.yaml`
//! 2. `~/.config/ads/node.yaml`
//! 3. `.ads/node.yaml` (workspace-local)
//! 4. Path given to [`load`] explicitly.
//!
//! **All defaults are production-safe.** Running `load(None)` with no config
//! file gives you TLS on and a loopback bind.
//!
//! # Loading
//!
//! ```rust
//! use ads_node::config::{NodeConfig, load};
//!
//! // Load from the default search paths (no explicit file).
//! let config = load(None).unwrap();
//!
//! // Defaults are secure.
//! assert!(!config.http.insecure_dev_mode);     // TLS is on
//! assert!(config.http.bind.starts_with("127.0.0.1")); // loopback only
//! ```
//!
//! # Example full config
//! ```yaml
//! http:
//!   bind: "127.0.0.1:18790"
//!   # TLS is on by default. Set insecure_dev_mode: true ONLY for local development.
//!   insecure_dev_mode: false
//!
//! auth:
//!   credentials_file: "~/.config/ads/credentials.yaml"
//!   session_ttl_secs: 2592000
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_http_bind() -> String {
    "127.0.0.1:18790".to_string()
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// `host:port` to listen on. Default: `127.0.0.1:18790` (loopback only).
    #[serde(default = "default_http_bind")]
    pub bind: String,

    /// TLS is **enabled by default**. Set this to `true` only for local
    /// development. The flag is intentionally named to make it uncomfortable
    /// to leave on in production.
    #[serde(default)]
    pub insecure_dev_mode: bool,

    /// Directory where the auto-generated ECDSA P-256 certificate and private
    /// key are stored. Defaults to `~/.config/ads/tls/`.
    pub tls_cert_dir: Option<PathBuf>,

    /// Maximum request body size in bytes (default: 4 MiB).
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Origins allowed to open a WebSocket connection. Empty means
    /// same-origin-only (no `Origin` header, or a header matching `bind`).
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Maximum number of concurrent WebSocket clients per session before new
    /// connections are closed with code `4409`.
    #[serde(default = "default_max_clients")]
    pub max_clients_per_session: usize,

    /// Consecutive missed pongs before a WebSocket connection is terminated.
    #[serde(default = "default_max_missed_pongs")]
    pub max_missed_pongs: u32,
}

fn default_max_body() -> usize {
    4 * 1024 * 1024
}
fn default_max_clients() -> usize {
    4
}
fn default_max_missed_pongs() -> u32 {
    3
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            insecure_dev_mode: false,
            tls_cert_dir: None,
            max_body_bytes: default_max_body(),
            allowed_origins: Vec::new(),
            max_clients_per_session: default_max_clients(),
            max_missed_pongs: default_max_missed_pongs(),
        }
    }
}

/// Scrypt-based admin authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to the YAML file storing the admin username and scrypt password
    /// hash. Defaults to `~/.config/ads/credentials.yaml`.
    pub credentials_file: Option<PathBuf>,

    /// How long an issued session token remains valid, in seconds.
    /// Default: 30 days.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Failed login attempts allowed per minute before the login endpoint
    /// starts rejecting requests with 429.
    #[serde(default = "default_login_rate_per_min")]
    pub login_attempts_per_min: u32,
}

fn default_session_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}
fn default_login_rate_per_min() -> u32 {
    10
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            session_ttl_secs: default_session_ttl_secs(),
            login_attempts_per_min: default_login_rate_per_min(),
        }
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(PathBuf::from("/etc/ads/node.yaml"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/ads/node.yaml"));
    }
    paths.push(PathBuf::from(".ads/node.yaml"));
    paths
}

pub fn load(extra: Option<&Path>) -> anyhow::Result<NodeConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading node config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit node config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: NodeConfig = if matches!(&merged, serde_yaml::Value::Mapping(m) if m.is_empty()) {
        NodeConfig::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    Ok(config)
}

fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_http_bind_is_loopback() {
        let c = NodeConfig::default();
        assert!(
            c.http.bind.starts_with("127.0.0.1"),
            "default must be loopback-only"
        );
    }

    #[test]
    fn default_tls_is_enabled() {
        let c = NodeConfig::default();
        assert!(!c.http.insecure_dev_mode, "TLS must be on by default");
    }

    #[test]
    fn default_session_ttl_is_thirty_days() {
        let c = NodeConfig::default();
        assert_eq!(c.auth.session_ttl_secs, 30 * 24 * 60 * 60);
    }

    #[test]
    fn config_yaml_round_trip() {
        let c = NodeConfig::default();
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: NodeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.http.bind, c.http.bind);
        assert_eq!(back.http.insecure_dev_mode, c.http.insecure_dev_mode);
    }

    #[test]
    fn config_insecure_dev_mode_can_be_set() {
        let yaml = "http:\n  insecure_dev_mode: true\n";
        let c: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(c.http.insecure_dev_mode);
    }

    #[test]
    fn load_returns_defaults_when_no_files_exist() {
        let c = load(None).unwrap();
        assert_eq!(c.http.bind, default_http_bind());
    }
}
