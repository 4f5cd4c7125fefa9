//! In-memory directory of currently-connected validators
//!
//! Process-local cache over the durable validator store: entries are
//! created by signup traffic and dropped on disconnect, never read back
//! from the database. Keyed by validator id, so a re-signup from a known
//! public key replaces the previous live session instead of appending a
//! duplicate.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Live handle for one WebSocket session.
///
/// The registry owns the only reference shared outside the session task;
/// frames pushed here are serialized JSON, forwarded to the socket by the
/// session's outbound pump.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame for delivery. Fails only when the session has closed.
    pub fn send(&self, frame: String) -> Result<(), mpsc::error::SendError<String>> {
        self.tx.send(frame)
    }
}

/// One connected, signup-verified validator
#[derive(Debug, Clone)]
pub struct RegisteredValidator {
    pub validator_id: String,
    /// Base58 public key captured at signup; the trust anchor for every
    /// result this validator later reports
    pub public_key: String,
    pub connection: ConnectionHandle,
}

/// Concurrent registry of live validator sessions
#[derive(Default)]
pub struct ValidatorRegistry {
    entries: DashMap<String, RegisteredValidator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the live entry for a validator id
    pub fn register(&self, validator: RegisteredValidator) {
        let id = validator.validator_id.clone();
        if self.entries.insert(id.clone(), validator).is_some() {
            debug!("Replaced live session for validator {}", id);
        }
    }

    /// Point-in-time list of connected validators. Readers tolerate a
    /// slightly stale view; this never blocks registration for long.
    pub fn snapshot(&self) -> Vec<RegisteredValidator> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Drop every entry bound to a closed connection. Returns the number
    /// of entries removed.
    pub fn remove_connection(&self, connection_id: Uuid) -> usize {
        // Counted inside the closure; differencing len() around the retain
        // races with concurrent registrations.
        let mut removed = 0;
        self.entries.retain(|_, v| {
            let keep = v.connection.id() != connection_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
