// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP API handlers: login/logout and task/queue control (spec.md §4.N).

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use ads_store::queries::task_bundle_drafts::{self, DraftTaskInput};
use ads_store::queries::tasks::{self, TaskFilter, TaskStatus};
use ads_store::queries::{projects, users};
use ads_store::RunRequestOutcome;

use super::AppState;

const SESSION_COOKIE: &str = "ads_session";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { kind: kind.to_string(), message: message.into() })).into_response()
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Response {
    if !state.check_login_rate(&addr.ip().to_string()) {
        return error_response(StatusCode::TOO_MANY_REQUESTS, "rate_limit", "too many login attempts");
    }

    let Some(credentials) = state.credentials.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "config", "no admin credentials configured");
    };

    if !credentials.verify(&req.username, &req.password) {
        return error_response(StatusCode::UNAUTHORIZED, "auth", "invalid username or password");
    }

    let user_id = {
        let db = state.global_db.lock().await;
        match users::upsert_from_credentials(
            db.conn(),
            &uuid::Uuid::new_v4().to_string(),
            &req.username,
            credentials.password_hash.as_str(),
            chrono::Utc::now(),
        ) {
            Ok(user) => user.id,
            Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
        }
    };

    let token = match state.issue_session(&user_id).await {
        Ok(token) => token,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    };
    let ttl_secs = state.node_config.auth.session_ttl_secs as i64;
    let cookie = Cookie::build((SESSION_COOKIE, token.as_str().to_string()))
        .http_only(true)
        .secure(!state.node_config.http.insecure_dev_mode)
        .same_site(axum_extra::extract::cookie::SameSite::Strict)
        .max_age(time::Duration::seconds(ttl_secs))
        .path("/")
        .build();

    (jar.add(cookie), StatusCode::NO_CONTENT).into_response()
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.revoke(cookie.value()).await;
    }
    (jar.remove(Cookie::from(SESSION_COOKIE)), StatusCode::NO_CONTENT).into_response()
}

async fn require_session(state: &AppState, jar: &CookieJar) -> Result<String, Response> {
    let raw = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "auth", "missing session cookie"))?;
    state
        .authenticate(&raw)
        .await
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "auth", "expired or unknown session"))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub input: String,
    #[serde(default)]
    pub max_retries: Option<i64>,
}

pub async fn list_tasks(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    let db = state.db.lock().await;
    let workspace = state.workspace_root.display().to_string();
    let filter = TaskFilter { workspace: Some(workspace), status: None };
    match tasks::list_tasks(db.conn(), &filter) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

pub async fn create_task(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CreateTaskRequest>,
) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    let db = state.db.lock().await;
    let workspace = state.workspace_root.display().to_string();
    let id = uuid::Uuid::new_v4().to_string();
    match tasks::create_task(
        db.conn(),
        &id,
        &workspace,
        &req.input,
        chrono::Utc::now(),
        TaskStatus::Queued,
        req.max_retries.unwrap_or(state.agent_config.queue.default_max_retries),
    ) {
        Ok(task) => {
            drop(db);
            state.queue.notify_new_task();
            (StatusCode::CREATED, Json(task)).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

pub async fn run_task(State(state): State<AppState>, jar: CookieJar, Path(id): Path<String>) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    match state.run_controller.request_single_task_run(&id).await {
        Ok(RunRequestOutcome::AlreadyActive) => StatusCode::ACCEPTED.into_response(),
        Ok(RunRequestOutcome::Started) => StatusCode::NO_CONTENT.into_response(),
        Err(ads_store::RunControllerError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "input", "task not found")
        }
        Err(e) => error_response(StatusCode::CONFLICT, "input", e.to_string()),
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub state: String,
    pub mode: String,
}

pub async fn queue_status(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    let state_str = match state.queue.state().await {
        ads_store::QueueState::Stopped => "stopped",
        ads_store::QueueState::Running => "running",
        ads_store::QueueState::Paused => "paused",
    };
    let mode_str = match state.run_controller.mode().await {
        ads_store::RunMode::Manual => "manual",
        ads_store::RunMode::All => "all",
        ads_store::RunMode::Single => "single",
    };
    Json(QueueStatusResponse { state: state_str.to_string(), mode: mode_str.to_string() }).into_response()
}

pub async fn queue_start(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    state.run_controller.set_mode_all().await;
    StatusCode::NO_CONTENT.into_response()
}

pub async fn queue_pause(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    state.run_controller.set_mode_manual().await;
    StatusCode::NO_CONTENT.into_response()
}

// ── Projects (spec.md §4.N, §8 S3) ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub workspace_root: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub chat_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderProjectsRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    pub success: bool,
}

pub async fn list_projects(State(state): State<AppState>, jar: CookieJar) -> Response {
    let user_id = match require_session(&state, &jar).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let db = state.global_db.lock().await;
    match projects::list(db.conn(), &user_id) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

pub async fn create_project(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CreateProjectRequest>,
) -> Response {
    let user_id = match require_session(&state, &jar).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let db = state.global_db.lock().await;
    let id = uuid::Uuid::new_v4().to_string();
    match projects::create(db.conn(), &user_id, &id, &req.workspace_root, &req.display_name, chrono::Utc::now()) {
        Ok(project) => (StatusCode::CREATED, Json(project)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

pub async fn update_project(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> Response {
    let user_id = match require_session(&state, &jar).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let db = state.global_db.lock().await;
    match projects::update(
        db.conn(),
        &user_id,
        &id,
        req.display_name.as_deref(),
        req.chat_session_id.as_deref(),
        chrono::Utc::now(),
    ) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "input", "project not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

pub async fn delete_project(State(state): State<AppState>, jar: CookieJar, Path(id): Path<String>) -> Response {
    let user_id = match require_session(&state, &jar).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let db = state.global_db.lock().await;
    match projects::delete(db.conn(), &user_id, &id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "input", "project not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

pub async fn reorder_projects(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<ReorderProjectsRequest>,
) -> Response {
    let user_id = match require_session(&state, &jar).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let db = state.global_db.lock().await;
    match projects::reorder(db.conn(), &user_id, &req.ids, chrono::Utc::now()) {
        Ok(()) => Json(ReorderResponse { success: true }).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

// ── Task Bundle Drafts (spec.md §4.N, §8 S6) ───────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskBundleDraftRequest {
    pub tasks: Vec<DraftTaskInput>,
}

#[derive(Debug, Serialize)]
pub struct ApproveTaskBundleDraftResponse {
    pub created_task_ids: Vec<String>,
}

pub async fn create_task_bundle_draft(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CreateTaskBundleDraftRequest>,
) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    let db = state.db.lock().await;
    let id = uuid::Uuid::new_v4().to_string();
    match task_bundle_drafts::create(db.conn(), &id, &req.tasks, chrono::Utc::now()) {
        Ok(draft) => (StatusCode::CREATED, Json(draft)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

/// Idempotent: repeat calls return the same `created_task_ids` without
/// creating duplicate tasks (spec.md §8 S6).
pub async fn approve_task_bundle_draft(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = require_session(&state, &jar).await {
        return resp;
    }
    let db = state.db.lock().await;
    let workspace = state.workspace_root.display().to_string();
    let default_max_retries = state.agent_config.queue.default_max_retries;
    let next_task_id = || uuid::Uuid::new_v4().to_string();
    match task_bundle_drafts::approve(db.conn(), &id, &workspace, default_max_retries, chrono::Utc::now(), next_task_id)
    {
        Ok(created_task_ids) => {
            drop(db);
            state.queue.notify_new_task();
            Json(ApproveTaskBundleDraftResponse { created_task_ids }).into_response()
        }
        Err(ads_store::StorageError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "input", "task bundle draft not found")
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}
