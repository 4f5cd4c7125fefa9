//! Durable storage behind the hub
//!
//! The hub touches the relational store through the narrow [`Store`]
//! trait: the enabled-site list and validator identities flow in, tick
//! records and payout credits flow out. Everything else in the database
//! belongs to the REST layer and is off limits here.

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use crate::wire::CheckStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enabled monitored website, refreshed once per dispatch cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: String,
    pub url: String,
}

/// Persistent validator identity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRecord {
    /// Store-issued stable id
    pub id: String,
    /// Base58-encoded Ed25519 verification key
    pub public_key: String,
    /// Last-seen origin address
    pub ip: String,
    /// Best-effort geolocation, may be "unknown"
    pub location: String,
    /// Accumulated unsettled compensation, smallest payment unit
    pub pending_payout: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("connection pool error: {0}")]
    Pool(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}

/// Narrow interface the hub consumes from the external store
#[async_trait]
pub trait Store: Send + Sync {
    /// Current list of enabled monitored websites
    async fn list_enabled_sites(&self) -> Result<Vec<Website>, StoreError>;

    /// Look up a validator identity by its public key
    async fn find_validator_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<ValidatorRecord>, StoreError>;

    /// Mint a new validator identity for an unseen public key
    async fn create_validator(
        &self,
        public_key: &str,
        ip: &str,
        location: &str,
    ) -> Result<ValidatorRecord, StoreError>;

    /// Append one tick and credit the validator's pending payout by
    /// `reward`, as a single atomic unit. On failure neither effect is
    /// observable; the caller logs and moves on, the next dispatch cycle
    /// re-issues a fresh check.
    async fn commit_tick(
        &self,
        website_id: &str,
        validator_id: &str,
        status: CheckStatus,
        latency_ms: i64,
        reward: i64,
    ) -> Result<(), StoreError>;
}
