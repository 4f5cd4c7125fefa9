//! Per-connection WebSocket session handling
//!
//! One task pumps inbound frames, a second forwards outbound frames
//! queued on the connection's channel. Two inbound message types exist:
//! `signup` performs signature-verified admission, `validate` routes a
//! check reply through the correlation table. Nothing a peer sends can
//! take down the session loop, let alone the process.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::{ConnectionHandle, RegisteredValidator};
use crate::server::HubState;
use crate::signature;
use crate::wire::{CheckResult, Incoming, Outgoing, SignupAck, SignupRequest};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HubState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!("Validator connection from {}", addr);
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Drive one validator session until the peer disconnects
async fn handle_socket(socket: WebSocket, state: Arc<HubState>, addr: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = ConnectionHandle::new(tx);
    let conn_id = conn.id();

    // Outbound pump: registry and dispatcher push frames through the
    // channel, only this task touches the socket sink
    let pump = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &conn, addr, &text).await;
            }
            Ok(Message::Close(_)) => {
                debug!("Validator {} closed connection", addr);
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
            _ => {}
        }
    }

    let removed = state.registry.remove_connection(conn_id);
    if removed > 0 {
        info!("Validator session from {} ended, removed from registry", addr);
    }
    // In-flight checks for this connection are left to the TTL sweep
    pump.abort();
}

/// Route one inbound frame. Separated from the socket loop so sessions
/// can be exercised in tests over plain channels.
pub async fn handle_frame(state: &HubState, conn: &ConnectionHandle, addr: SocketAddr, text: &str) {
    let msg: Incoming = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Unparseable frame from {}: {}", addr, e);
            return;
        }
    };

    match msg {
        Incoming::Signup(req) => handle_signup(state, conn, addr, req).await,
        Incoming::Validate(result) => handle_validate(state, result).await,
    }
}

/// Validator admission: prove key ownership, look up or mint an
/// identity, ack, and join the registry
async fn handle_signup(state: &HubState, conn: &ConnectionHandle, addr: SocketAddr, req: SignupRequest) {
    let message = signature::signup_message(&req.callback_id, &req.public_key);
    if !signature::verify_signature(&message, &req.public_key, &req.signed_message) {
        // Dropped without a reply; unauthenticated peers learn nothing
        debug!("Rejected signup with invalid signature from {}", addr);
        return;
    }

    let record = match state.store.find_validator_by_public_key(&req.public_key).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            match state
                .store
                .create_validator(&req.public_key, &req.ip, "unknown")
                .await
            {
                Ok(record) => {
                    info!("Created validator {} for new public key", record.id);
                    record
                }
                Err(e) => {
                    warn!("Validator creation failed: {}", e);
                    return;
                }
            }
        }
        Err(e) => {
            warn!("Validator lookup failed: {}", e);
            return;
        }
    };

    let ack = Outgoing::Signup(SignupAck {
        validator_id: record.id.clone(),
        callback_id: req.callback_id,
    });
    let frame = match serde_json::to_string(&ack) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to serialize signup ack: {}", e);
            return;
        }
    };
    if conn.send(frame).is_err() {
        debug!("Signup ack dropped, connection already closed");
        return;
    }

    state.registry.register(RegisteredValidator {
        validator_id: record.id.clone(),
        public_key: record.public_key,
        connection: conn.clone(),
    });
    info!("Validator {} signed up from {}", record.id, addr);
}

/// Route a check reply through the correlation table and, if it
/// verifies against the dispatch-time key, settle it in the ledger
async fn handle_validate(state: &HubState, result: CheckResult) {
    // First reply wins; the entry is consumed even if verification
    // fails below, so a replay of the same token is a no-op
    let Some(pending) = state.correlation.resolve(&result.callback_id) else {
        debug!("No pending check for callback {}", result.callback_id);
        return;
    };

    // The trust anchor is the public key of the validator the request
    // was dispatched to; the reply's validatorId is record-keeping only
    let message = signature::validate_message(&result.validator_id);
    if !signature::verify_signature(&message, &pending.public_key, &result.signed_message) {
        warn!(
            "Rejected check result with invalid signature for website {} (dispatched to validator {})",
            pending.website_id, pending.validator_id
        );
        return;
    }

    if result.latency < 0 {
        warn!(
            "Rejected check result with negative latency ({} ms) for website {}",
            result.latency, pending.website_id
        );
        return;
    }

    if let Err(e) = state
        .store
        .commit_tick(
            &pending.website_id,
            &result.validator_id,
            result.status,
            result.latency,
            state.config.cost_per_validation,
        )
        .await
    {
        // Dropped without retry; the next cycle re-issues a fresh check
        warn!("Tick commit failed for website {}: {}", pending.website_id, e);
        return;
    }

    debug!(
        "Recorded {} tick for website {} from validator {} ({} ms)",
        result.status.as_str(),
        pending.website_id,
        result.validator_id,
        result.latency
    );
}
