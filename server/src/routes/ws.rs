//! WebSocket handler — bidirectional envelope relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection id, records the client's claimed
//! permission level, and enters a `select!` loop:
//! - Incoming client text frames → decode + dispatch by operation flag
//! - Broadcast envelopes from peers → forward to the client
//!
//! Dispatch returns an `Outcome`; this layer owns every send. Replies go
//! straight to the sender's socket, broadcasts fan out through the session's
//! client map (the sender receives its own echo and ignores it).
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register in the fan-out map → send hello with `connection_id`
//! 2. Client sends envelopes → dispatch → apply Outcome
//! 3. Close → deregister

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use board::UserLevel;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wire::{Envelope, ErrorCode, Operation};

use crate::services;
use crate::state::{AppState, CLIENT_QUEUE_CAPACITY, ConnectedClient};

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of dispatching one inbound envelope. The relay loop uses this to
/// decide who receives what — dispatch never sends frames itself.
#[derive(Debug, PartialEq)]
enum Outcome {
    /// Send to the sender only (fetch-state snapshots, rejections).
    Reply(Envelope),
    /// Fan out to every connected client, sender included.
    Broadcast(Envelope),
    /// Intentional drop; nothing is sent.
    Drop,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user) = params.get("user").cloned() else {
        return (StatusCode::BAD_REQUEST, "user required").into_response();
    };
    let level = match params.get("level").map(String::as_str) {
        Some("high") => UserLevel::High,
        _ => UserLevel::Low,
    };
    ws.on_upgrade(move |socket| run_ws(socket, state, user, level))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, user: String, level: UserLevel) {
    let connection_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast envelopes from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Envelope>(CLIENT_QUEUE_CAPACITY);
    let hello = {
        let mut session = state.board.write().await;
        let client = ConnectedClient { user: user.clone(), level, tx: client_tx };
        session.clients.insert(connection_id, client);
        Envelope::hello(connection_id.to_string(), session.replica.generation())
            .with_checkpoint_number(state.checkpoints.count())
    };

    // Acknowledge the connection before relaying anything else.
    if send_envelope(&mut socket, &hello).await.is_err() {
        state.board.write().await.clients.remove(&connection_id);
        return;
    }

    info!(%connection_id, %user, ?level, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let outcome = dispatch_text(&state, &text).await;
                        if apply_outcome(&state, &mut socket, outcome).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(envelope) = client_rx.recv() => {
                if send_envelope(&mut socket, &envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    state.board.write().await.clients.remove(&connection_id);
    info!(%connection_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode one inbound text frame and route it by operation flag.
async fn dispatch_text(state: &AppState, text: &str) -> Outcome {
    match wire::decode_envelope(text) {
        Ok(envelope) => dispatch_envelope(state, envelope).await,
        Err(e) => {
            warn!(error = %e, "ws: undecodable frame");
            Outcome::Reply(Envelope::rejection(Operation::FetchState, &DecodeRejection(e)))
        }
    }
}

/// Route a decoded envelope to the board service.
async fn dispatch_envelope(state: &AppState, envelope: Envelope) -> Outcome {
    match envelope.op {
        Operation::FetchState => {
            Outcome::Reply(services::board::fetch_state(state, &envelope.requester).await)
        }
        Operation::CreateCheckpoint => {
            match services::board::save_checkpoint(state, &envelope.requester).await {
                Ok(announce) => Outcome::Broadcast(announce),
                Err(e) => {
                    warn!(error = %e, "checkpoint save failed");
                    Outcome::Reply(Envelope::rejection(envelope.op, &e))
                }
            }
        }
        Operation::FetchCheckpoint => {
            match services::board::fetch_checkpoint(
                state,
                envelope.checkpoint_number,
                &envelope.requester,
            )
            .await
            {
                Ok(restored) => Outcome::Broadcast(restored),
                Err(e) => {
                    warn!(error = %e, number = envelope.checkpoint_number, "checkpoint fetch failed");
                    Outcome::Reply(Envelope::rejection(envelope.op, &e))
                }
            }
        }
        _ => match services::board::save_update(state, &envelope).await {
            Ok(()) => Outcome::Broadcast(envelope),
            Err(e) if e.is_intentional_drop() => {
                debug!(reason = %e, "update dropped");
                Outcome::Drop
            }
            Err(e) => {
                warn!(error = %e, op = ?envelope.op, "update rejected");
                Outcome::Reply(Envelope::rejection(envelope.op, &e))
            }
        },
    }
}

/// Wrapper giving codec failures a grepable code for the rejection reply.
struct DecodeRejection(wire::CodecError);

impl std::fmt::Display for DecodeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ErrorCode for DecodeRejection {
    fn error_code(&self) -> &'static str {
        "E_DECODE"
    }
}

// =============================================================================
// DELIVERY
// =============================================================================

async fn apply_outcome(
    state: &AppState,
    socket: &mut WebSocket,
    outcome: Outcome,
) -> Result<(), axum::Error> {
    match outcome {
        Outcome::Reply(envelope) => send_envelope(socket, &envelope).await,
        Outcome::Broadcast(envelope) => {
            services::board::broadcast(state, &envelope).await;
            Ok(())
        }
        Outcome::Drop => Ok(()),
    }
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), axum::Error> {
    match wire::encode_envelope(envelope) {
        Ok(text) => socket.send(Message::Text(text.into())).await,
        Err(e) => {
            warn!(error = %e, "ws: envelope encode failed");
            Ok(())
        }
    }
}
