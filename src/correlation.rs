//! Correlation table matching dispatched checks to their replies
//!
//! Every dispatched check registers a single-use token mapping to the
//! dispatch-time context needed to verify and settle the eventual reply.
//! The first resolve for a token wins; duplicates, late replies, and
//! forged tokens all hit an absent entry and are defined no-ops.
//!
//! Entries that never resolve (validator vanished mid-check) are reclaimed
//! by a TTL sweep and counted as a distinct timeout outcome.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Dispatch-time context for one in-flight check.
///
/// A plain data record rather than a closure, so it stays inspectable in
/// logs and shareable across tasks. `public_key` is the key the reply's
/// signature must verify against, regardless of what the reply claims.
#[derive(Debug, Clone)]
pub struct PendingCheck {
    pub validator_id: String,
    pub public_key: String,
    pub website_id: String,
    pub website_url: String,
    pub connection_id: Uuid,
    pub dispatched_at: Instant,
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    /// Tokens are hub-generated UUIDs; a collision is a programming error,
    /// not a runtime condition to recover from
    #[error("callback token {0} is already registered")]
    DuplicateToken(String),
}

/// Concurrent token → pending-check table
#[derive(Default)]
pub struct CorrelationTable {
    entries: DashMap<String, PendingCheck>,
    timed_out: AtomicU64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending check under a fresh token
    pub fn register(&self, token: &str, pending: PendingCheck) -> Result<(), CorrelationError> {
        match self.entries.entry(token.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CorrelationError::DuplicateToken(token.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(pending);
                Ok(())
            }
        }
    }

    /// Atomically take the pending check for a token.
    ///
    /// Returns `None` for unknown, already-resolved, or expired tokens.
    /// At most one caller can ever receive the entry for a given token.
    pub fn resolve(&self, token: &str) -> Option<PendingCheck> {
        self.entries.remove(token).map(|(_, pending)| pending)
    }

    /// Remove entries older than `ttl`, counting them as timeouts.
    /// Returns how many were removed.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, pending| {
            if pending.dispatched_at.elapsed() >= ttl {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.timed_out.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Number of checks currently awaiting a reply
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total checks reclaimed by the TTL sweep since startup
    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(validator_id: &str, age: Duration) -> PendingCheck {
        PendingCheck {
            validator_id: validator_id.to_string(),
            public_key: "key".to_string(),
            website_id: "site-1".to_string(),
            website_url: "https://example.com".to_string(),
            connection_id: Uuid::new_v4(),
            dispatched_at: Instant::now().checked_sub(age).unwrap(),
        }
    }

    #[test]
    fn test_resolve_once() {
        let table = CorrelationTable::new();
        table.register("cb-1", pending("v-1", Duration::ZERO)).unwrap();

        let first = table.resolve("cb-1");
        assert_eq!(first.unwrap().validator_id, "v-1");

        // Duplicate or late reply for the same token is a no-op
        assert!(table.resolve("cb-1").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_token_is_noop() {
        let table = CorrelationTable::new();
        assert!(table.resolve("never-registered").is_none());
        assert_eq!(table.len(), 0);
        assert_eq!(table.timed_out(), 0);
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let table = CorrelationTable::new();
        table.register("cb-1", pending("v-1", Duration::ZERO)).unwrap();

        let err = table
            .register("cb-1", pending("v-2", Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, CorrelationError::DuplicateToken(_)));

        // Original entry is untouched
        assert_eq!(table.resolve("cb-1").unwrap().validator_id, "v-1");
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let table = CorrelationTable::new();
        table
            .register("stale", pending("v-1", Duration::from_secs(700)))
            .unwrap();
        table.register("fresh", pending("v-2", Duration::ZERO)).unwrap();

        let removed = table.sweep_expired(Duration::from_secs(600));
        assert_eq!(removed, 1);
        assert_eq!(table.timed_out(), 1);
        assert!(table.resolve("stale").is_none());
        assert!(table.resolve("fresh").is_some());
    }
}
