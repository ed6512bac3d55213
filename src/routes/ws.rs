//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade the connection enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - `session:state` pushes from session peers → forward to the client
//!
//! Handler functions validate, call into services, and return an `Outcome`
//! for the sender; the services broadcast to peers under the session lock,
//! so this layer never fans out itself.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` (carries a suggested connection id
//!    for clients that have not persisted one yet)
//! 2. `session:join` binds the connection to one session and identity
//! 3. `round:*` syscalls mutate that session
//! 4. Close or transport drop → leave, which broadcasts the healed roster

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::deck::CardPosition;
use crate::frame::{Data, Frame};
use crate::services::{round, session};
use crate::state::{AppState, ParticipantIdentity};

// =============================================================================
// OUTCOME
// =============================================================================

/// What the sender receives back. Peer fan-out already happened inside the
/// service call, under the same lock as the mutation.
enum Outcome {
    /// Send done+data to sender.
    Reply(Data),
    /// Send empty done to sender.
    Done,
}

/// The session and identity this connection has joined as.
struct Joined {
    hash_id: String,
    identity: ParticipantIdentity,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    // Per-connection channel for receiving snapshot pushes from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(256);

    // Clients that have no persisted connection id adopt the suggested one.
    let welcome = Frame::request("session:connected", Data::new())
        .with_data("suggested_connection_id", Uuid::new_v4().to_string());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!("ws: client connected");

    let mut joined: Option<Joined> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut joined, &client_tx, &text).await;
                        for frame in replies {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    // Abrupt drop and voluntary close share the leave path, so the roster
    // self-heals without client cooperation.
    if let Some(Joined { hash_id, identity }) = joined {
        session::leave(&state, &hash_id, &identity.connection_id, &client_tx).await;
        info!(%hash_id, connection_id = %identity.connection_id, "ws: client disconnected");
    } else {
        info!("ws: client disconnected");
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the
/// sender. Split from the socket loop so tests can exercise dispatch with a
/// plain channel standing in for the transport.
async fn process_inbound_text(
    state: &AppState,
    joined: &mut Option<Joined>,
    client_tx: &mpsc::Sender<Frame>,
    text: &str,
) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new())
                .with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Stamp the bound identity as `from` once joined.
    if let Some(j) = joined.as_ref() {
        req.from = Some(j.identity.connection_id.clone());
    }
    info!(id = %req.id, syscall = %req.syscall, "ws: recv frame");

    let result = match req.prefix() {
        "session" => handle_session(state, joined, client_tx, &req).await,
        "round" => handle_round(state, joined.as_ref(), &req).await,
        other => Err(req.error(format!("unknown prefix: {other}"))),
    };

    match result {
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// SESSION HANDLERS
// =============================================================================

async fn handle_session(
    state: &AppState,
    joined: &mut Option<Joined>,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    match req.op() {
        "join" => {
            let Some(hash_id) = req.session_id.clone().or_else(|| {
                req.data
                    .get("hash_id")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string)
            }) else {
                return Err(req.error("hash_id required"));
            };
            let identity = parse_identity(&req.data).ok_or_else(|| req.error("connection_id required"))?;

            // One session per connection, but the old binding is released
            // only once the new join has succeeded: a rejected join must
            // leave the current session untouched.
            match session::join(state, &hash_id, identity.clone(), client_tx.clone()).await {
                Ok(snapshot) => {
                    if let Some(old) = joined.take() {
                        let rebind = old.hash_id == hash_id
                            && old.identity.connection_id == identity.connection_id;
                        if !rebind {
                            session::leave(state, &old.hash_id, &old.identity.connection_id, client_tx)
                                .await;
                        }
                    }
                    *joined = Some(Joined { hash_id, identity });
                    Ok(Outcome::Reply(snapshot.into_data()))
                }
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "leave" => {
            let Some(Joined { hash_id, identity }) = joined.take() else {
                return Err(req.error("not joined to any session"));
            };
            session::leave(state, &hash_id, &identity.connection_id, client_tx).await;
            Ok(Outcome::Done)
        }
        op => Err(req.error(format!("unknown session op: {op}"))),
    }
}

// =============================================================================
// ROUND HANDLERS
// =============================================================================

async fn handle_round(
    state: &AppState,
    joined: Option<&Joined>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    let Some(Joined { hash_id, identity }) = joined else {
        return Err(req.error("must join a session first"));
    };

    match req.op() {
        "start" => {
            let name = req
                .data
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled Round");
            let description = req
                .data
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");

            match round::start(state, hash_id, identity, name, description).await {
                Ok(snapshot) => Ok(Outcome::Reply(snapshot.into_data())),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "vote" => {
            let (Some(row), Some(column)) = (data_usize(&req.data, "row"), data_usize(&req.data, "column"))
            else {
                return Err(req.error("row and column required"));
            };

            match round::cast_vote(state, hash_id, identity, CardPosition { row, column }).await {
                Ok(snapshot) => Ok(Outcome::Reply(snapshot.into_data())),
                Err(e) => Err(req.error_from(&e)),
            }
        }
        "reveal" => match round::reveal(state, hash_id, identity).await {
            Ok(snapshot) => Ok(Outcome::Reply(snapshot.into_data())),
            Err(e) => Err(req.error_from(&e)),
        },
        op => Err(req.error(format!("unknown round op: {op}"))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn parse_identity(data: &Data) -> Option<ParticipantIdentity> {
    let connection_id = data.get("connection_id")?.as_str()?.to_string();
    if connection_id.is_empty() {
        return None;
    }
    Some(ParticipantIdentity {
        connection_id,
        first_name: data
            .get("first_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        last_name: data
            .get("last_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        account_id: data
            .get("account_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok()),
    })
}

fn data_usize(data: &Data, key: &str) -> Option<usize> {
    data.get(key)
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == crate::frame::Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
