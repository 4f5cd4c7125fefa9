//! In-memory store for tests and local development
//!
//! Mirrors the PostgreSQL store's semantics, including all-or-nothing
//! tick commits, and adds failure injection so callers' error paths can
//! be exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Store, StoreError, ValidatorRecord, Website};
use crate::wire::CheckStatus;

/// One committed tick row
#[derive(Debug, Clone)]
pub struct TickRow {
    pub website_id: String,
    pub validator_id: String,
    pub status: CheckStatus,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    websites: Vec<Website>,
    validators: Vec<ValidatorRecord>,
    ticks: Vec<TickRow>,
    fail_commits: bool,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_website(&self, id: &str, url: &str) {
        self.inner.lock().websites.push(Website {
            id: id.to_string(),
            url: url.to_string(),
        });
    }

    /// Make every subsequent `commit_tick` fail, simulating an
    /// unavailable store
    pub fn fail_commits(&self, fail: bool) {
        self.inner.lock().fail_commits = fail;
    }

    pub fn ticks(&self) -> Vec<TickRow> {
        self.inner.lock().ticks.clone()
    }

    pub fn pending_payout(&self, validator_id: &str) -> Option<i64> {
        self.inner
            .lock()
            .validators
            .iter()
            .find(|v| v.id == validator_id)
            .map(|v| v.pending_payout)
    }

    pub fn validator_count(&self) -> usize {
        self.inner.lock().validators.len()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn list_enabled_sites(&self) -> Result<Vec<Website>, StoreError> {
        Ok(self.inner.lock().websites.clone())
    }

    async fn find_validator_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<ValidatorRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .validators
            .iter()
            .find(|v| v.public_key == public_key)
            .cloned())
    }

    async fn create_validator(
        &self,
        public_key: &str,
        ip: &str,
        location: &str,
    ) -> Result<ValidatorRecord, StoreError> {
        let record = ValidatorRecord {
            id: Uuid::new_v4().to_string(),
            public_key: public_key.to_string(),
            ip: ip.to_string(),
            location: location.to_string(),
            pending_payout: 0,
        };
        self.inner.lock().validators.push(record.clone());
        Ok(record)
    }

    async fn commit_tick(
        &self,
        website_id: &str,
        validator_id: &str,
        status: CheckStatus,
        latency_ms: i64,
        reward: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.fail_commits {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        // Validate before touching anything so a failure leaves no
        // partial effect, matching the postgres transaction
        let Some(idx) = inner.validators.iter().position(|v| v.id == validator_id) else {
            return Err(StoreError::Database(format!(
                "unknown validator {}",
                validator_id
            )));
        };

        inner.ticks.push(TickRow {
            website_id: website_id.to_string(),
            validator_id: validator_id.to_string(),
            status,
            latency_ms,
            created_at: Utc::now(),
        });
        inner.validators[idx].pending_payout += reward;
        Ok(())
    }
}
