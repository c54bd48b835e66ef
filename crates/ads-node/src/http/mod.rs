// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP/WebSocket front: TLS setup, the login-gated HTTP API, and the
//! WebSocket upgrade that drives [`crate::control::ControlService`].

pub mod api;
pub mod tls;
pub mod ws;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use governor::{Quota, RateLimiter};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use ads_config::Config;
use ads_store::queries::sessions as session_store;
use ads_store::{GlobalDb, RunController, TaskQueue, WorkspaceDb, WorkspaceLockPool};

use crate::config::HttpConfig;
use crate::control::session::SessionManager;
use crate::crypto::{CredentialsFile, StoredSessionToken};
use crate::NodeConfig;

pub type LoginLimiter = RateLimiter<
    String,
    governor::state::keyed::DefaultKeyedStateStore<String>,
    governor::clock::DefaultClock,
>;

/// Shared state every HTTP/WebSocket handler needs.
#[derive(Clone)]
pub struct AppState {
    pub node_config: Arc<NodeConfig>,
    pub agent_config: Arc<Config>,
    pub credentials: Arc<Option<CredentialsFile>>,
    pub sessions: Arc<SessionManager>,
    pub db: Arc<tokio::sync::Mutex<WorkspaceDb>>,
    pub global_db: Arc<tokio::sync::Mutex<GlobalDb>>,
    pub locks: Arc<WorkspaceLockPool>,
    pub run_controller: Arc<RunController>,
    pub queue: Arc<TaskQueue>,
    pub workspace_root: PathBuf,
    login_limiter: Arc<LoginLimiter>,
    ws_clients: Arc<Mutex<HashMap<String, usize>>>,
}

impl AppState {
    pub fn new(
        node_config: Arc<NodeConfig>,
        agent_config: Arc<Config>,
        credentials: Option<CredentialsFile>,
        sessions: Arc<SessionManager>,
        db: Arc<tokio::sync::Mutex<WorkspaceDb>>,
        global_db: Arc<tokio::sync::Mutex<GlobalDb>>,
        locks: Arc<WorkspaceLockPool>,
        run_controller: Arc<RunController>,
        queue: Arc<TaskQueue>,
        workspace_root: PathBuf,
    ) -> Self {
        let quota = Quota::per_minute(
            std::num::NonZeroU32::new(node_config.auth.login_attempts_per_min.max(1)).unwrap(),
        );
        Self {
            node_config,
            agent_config,
            credentials: Arc::new(credentials),
            sessions,
            db,
            global_db,
            locks,
            run_controller,
            queue,
            workspace_root,
            login_limiter: Arc::new(RateLimiter::keyed(quota)),
            ws_clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Issue a fresh session token for `user_id`, persisting only its hash
    /// (spec.md §3 Session invariant 3 — lookup never compares plaintext
    /// tokens). The raw token is returned once, for the `ads_session` cookie.
    pub async fn issue_session(&self, user_id: &str) -> anyhow::Result<crate::crypto::SessionToken> {
        let raw = crate::crypto::SessionToken::generate();
        let token_hash = StoredSessionToken::hash_raw(raw.as_str()).to_hex();
        let ttl_secs = self.node_config.auth.session_ttl_secs as i64;
        let db = self.global_db.lock().await;
        session_store::create(
            db.conn(),
            &uuid::Uuid::new_v4().to_string(),
            user_id,
            &token_hash,
            chrono::Utc::now(),
            ttl_secs,
            None,
        )?;
        Ok(raw)
    }

    /// Resolve the authenticated user id for a raw `ads_session` cookie
    /// value by hashing it and looking the row up by `token_hash` — the raw
    /// value itself is never compared or stored.
    pub async fn authenticate(&self, raw_cookie_value: &str) -> Option<String> {
        let token_hash = StoredSessionToken::hash_raw(raw_cookie_value).to_hex();
        let db = self.global_db.lock().await;
        let session = session_store::find_active(db.conn(), &token_hash, chrono::Utc::now()).ok()??;
        let _ = session_store::touch_last_seen(db.conn(), &token_hash, chrono::Utc::now(), None);
        Some(session.user_id)
    }

    async fn revoke(&self, raw_cookie_value: &str) {
        let token_hash = StoredSessionToken::hash_raw(raw_cookie_value).to_hex();
        let db = self.global_db.lock().await;
        let _ = session_store::revoke_by_token_hash(db.conn(), &token_hash, chrono::Utc::now());
    }

    fn check_login_rate(&self, key: &str) -> bool {
        self.login_limiter.check_key(&key.to_string()).is_ok()
    }

    /// Register a new WebSocket connection for `session_key`, rejecting it
    /// if `max_clients_per_session` is already reached.
    fn register_ws_client(&self, session_key: &str) -> bool {
        let mut clients = self.ws_clients.lock().unwrap();
        let count = clients.entry(session_key.to_string()).or_insert(0);
        if *count >= self.node_config.http.max_clients_per_session {
            return false;
        }
        *count += 1;
        true
    }

    fn release_ws_client(&self, session_key: &str) {
        let mut clients = self.ws_clients.lock().unwrap();
        if let Some(count) = clients.get_mut(session_key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                clients.remove(session_key);
            }
        }
    }
}

fn build_router(state: AppState) -> Router {
    let cors = if state.node_config.http.allowed_origins.is_empty() {
        CorsLayer::new().allow_methods([Method::GET, Method::POST])
    } else {
        let origins: Vec<_> = state
            .node_config
            .http
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods([Method::GET, Method::POST])
    };

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/auth/login", post(api::login))
        .route("/api/auth/logout", post(api::logout))
        .route("/api/projects", get(api::list_projects).post(api::create_project))
        .route("/api/projects/reorder", post(api::reorder_projects))
        .route("/api/projects/:id", axum::routing::patch(api::update_project).delete(api::delete_project))
        .route("/api/tasks", get(api::list_tasks).post(api::create_task))
        .route("/api/tasks/:id/run", post(api::run_task))
        .route("/api/task-bundle-drafts", post(api::create_task_bundle_draft))
        .route("/api/task-bundle-drafts/:id/approve", post(api::approve_task_bundle_draft))
        .route("/api/task-queue/status", get(api::queue_status))
        .route("/api/task-queue/start", post(api::queue_start))
        .route("/api/task-queue/pause", post(api::queue_pause))
        .layer(RequestBodyLimitLayer::new(state.node_config.http.max_body_bytes))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the HTTP/WebSocket front. Blocks until the server
/// shuts down.
pub async fn serve(http: &HttpConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr: std::net::SocketAddr =
        http.bind.parse().with_context(|| format!("invalid bind address {:?}", http.bind))?;

    let make_service = app.into_make_service_with_connect_info::<std::net::SocketAddr>();

    if http.insecure_dev_mode {
        info!(%addr, "starting HTTP node (insecure_dev_mode — no TLS)");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, make_service).await?;
    } else {
        let cert_dir = http.tls_cert_dir.clone().unwrap_or_else(tls::default_cert_dir);
        let runtime = tls::load_or_generate(&cert_dir)?;
        info!(%addr, fingerprint = %runtime.fingerprint_sha256, "starting HTTPS node");
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&runtime.cert_path, &runtime.key_path)
            .await
            .context("loading TLS cert/key into axum-server")?;
        axum_server::bind_rustls(addr, tls_config).serve(make_service).await?;
    }
    Ok(())
}
