// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! WebSocket front (spec.md §4.M): connection handshake (Origin allowlist,
//! session-cookie auth, per-session client cap, liveness ping/pong) and the
//! per-connection bridge between [`ClientMessage`]/[`ServerMessage`] JSON
//! frames and [`ControlService`].

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::header::ORIGIN;
use axum::http::HeaderMap;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::control::protocol::{ClientMessage, ServerMessage};
use crate::control::service::{AgentHandle, ControlService};

use super::AppState;

const SESSION_COOKIE: &str = "ads_session";
const LIVENESS_INTERVAL: Duration = Duration::from_secs(20);

/// Reject the upgrade with an HTTP status carrying the same semantics as the
/// WebSocket close code the client would otherwise have seen after
/// connecting (4401/4403/4409) — the handshake never reaches `on_upgrade`,
/// so there is no live socket to send a close frame on yet.
fn reject(status: axum::http::StatusCode, reason: &'static str) -> Response {
    axum::response::IntoResponse::into_response((status, reason))
}

fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    allowed.iter().any(|a| a == origin)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if !origin_allowed(&headers, &state.node_config.http.allowed_origins) {
        return reject(axum::http::StatusCode::FORBIDDEN, "origin not allowed");
    }

    let Some(raw_cookie) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
        return reject(axum::http::StatusCode::UNAUTHORIZED, "missing session cookie");
    };
    let Some(user_id) = state.authenticate(&raw_cookie).await else {
        return reject(axum::http::StatusCode::UNAUTHORIZED, "invalid or expired session");
    };

    if !state.register_ws_client(&user_id) {
        return reject(axum::http::StatusCode::CONFLICT, "too many connections for this session");
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, addr))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, user_id: String, peer: SocketAddr) {
    info!(%peer, user = %user_id, "WebSocket client connected");

    let service = ControlService::new(
        state.sessions.clone(),
        state.db.clone(),
        state.locks.clone(),
        state.workspace_root.clone(),
    );
    let handle = AgentHandle::new(user_id.clone());
    let cwd = state.workspace_root.clone();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(128);
    let max_missed_pongs = state.node_config.http.max_missed_pongs;
    let mut missed_pongs: u32 = 0;
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
    liveness.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = liveness.tick() => {
                missed_pongs += 1;
                if missed_pongs > max_missed_pongs {
                    warn!(%peer, user = %user_id, "missed {missed_pongs} liveness pongs, closing");
                    let _ = socket.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "liveness timeout".into(),
                    }))).await;
                    break;
                }
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        missed_pongs = 0;
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                let out_tx = out_tx.clone();
                                let handle_ref = &handle;
                                if let Err(e) = service.handle(handle_ref, &cwd, msg, &out_tx).await {
                                    let _ = out_tx.send(ServerMessage::Error {
                                        kind: "config".to_string(),
                                        message: e.to_string(),
                                    }).await;
                                }
                            }
                            Err(e) => {
                                let _ = out_tx.send(ServerMessage::Error {
                                    kind: "input".to_string(),
                                    message: format!("invalid message: {e}"),
                                }).await;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%peer, "WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if socket.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.release_ws_client(&user_id);
    info!(%peer, user = %user_id, "WebSocket client disconnected");
}
