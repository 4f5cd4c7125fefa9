//! Wire protocol messages exchanged with validator nodes
//!
//! All traffic is JSON over a persistent WebSocket, wrapped in a
//! `{"type": ..., "data": {...}}` envelope with camelCase payload fields.

use serde::{Deserialize, Serialize};

/// Outcome of a single uptime check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Good,
    Bad,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Good => "good",
            CheckStatus::Bad => "bad",
        }
    }
}

/// Validator → hub: signup handshake proving key ownership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// Peer-generated token echoed back in the ack
    pub callback_id: String,
    /// Base58-encoded Ed25519 public key
    pub public_key: String,
    /// Signature over the canonical signup message, JSON-array-encoded
    pub signed_message: String,
    pub ip: String,
}

/// Hub → validator: signup ack carrying the assigned identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupAck {
    pub validator_id: String,
    pub callback_id: String,
}

/// Hub → validator: one correlated check request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub url: String,
    /// Single-use correlation token, never reused
    pub callback_id: String,
    pub website_id: String,
}

/// Validator → hub: signed result for a dispatched check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub callback_id: String,
    pub website_id: String,
    pub validator_id: String,
    pub status: CheckStatus,
    /// Observed latency in milliseconds
    pub latency: i64,
    /// Signature over the canonical validate message, JSON-array-encoded
    pub signed_message: String,
}

/// Messages the hub accepts from a validator session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Incoming {
    Signup(SignupRequest),
    Validate(CheckResult),
}

/// Messages the hub sends to a validator session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Outgoing {
    Signup(SignupAck),
    Validate(CheckRequest),
}
