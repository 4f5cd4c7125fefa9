//! PostgreSQL store
//!
//! Shares the database with the REST layer that owns website CRUD and
//! validator settlement; the hub only reads sites/validators and writes
//! ticks + payout credits. Schema creation is idempotent so the hub can
//! start against an empty database in development.

use anyhow::Result;
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, StoreError, ValidatorRecord, Website};
use crate::wire::CheckStatus;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS validators (
    id TEXT PRIMARY KEY,
    public_key TEXT NOT NULL UNIQUE,
    ip TEXT NOT NULL,
    location TEXT NOT NULL DEFAULT 'unknown',
    pending_payout BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS websites (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    disabled BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_websites_disabled ON websites(disabled);

-- Append-only check outcomes; never mutated or deleted by the hub
CREATE TABLE IF NOT EXISTS website_ticks (
    id TEXT PRIMARY KEY,
    website_id TEXT NOT NULL,
    validator_id TEXT NOT NULL,
    status TEXT NOT NULL,
    latency_ms BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_ticks_website ON website_ticks(website_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_ticks_validator ON website_ticks(validator_id);
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Connect and run idempotent schema setup
    pub async fn new(database_url: &str) -> Result<Self> {
        let mut config = Config::new();
        config.url = Some(database_url.to_string());
        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        let client = pool.get().await?;
        info!("Connected to PostgreSQL database");

        client.batch_execute(SCHEMA).await?;
        info!("Database schema initialized");

        Ok(Self { pool })
    }

    /// Connect using the DATABASE_URL environment variable
    pub async fn from_env() -> Result<Self> {
        let url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
        Self::new(&url).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn list_enabled_sites(&self) -> Result<Vec<Website>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, url FROM websites WHERE disabled = FALSE ORDER BY created_at ASC",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| Website {
                id: r.get(0),
                url: r.get(1),
            })
            .collect())
    }

    async fn find_validator_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<ValidatorRecord>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT id, public_key, ip, location, pending_payout
                 FROM validators WHERE public_key = $1",
                &[&public_key],
            )
            .await?;

        Ok(row.map(|r| ValidatorRecord {
            id: r.get(0),
            public_key: r.get(1),
            ip: r.get(2),
            location: r.get(3),
            pending_payout: r.get(4),
        }))
    }

    async fn create_validator(
        &self,
        public_key: &str,
        ip: &str,
        location: &str,
    ) -> Result<ValidatorRecord, StoreError> {
        let id = Uuid::new_v4().to_string();
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO validators (id, public_key, ip, location) VALUES ($1, $2, $3, $4)",
                &[&id, &public_key, &ip, &location],
            )
            .await?;

        debug!("Created validator {} for public key", id);
        Ok(ValidatorRecord {
            id,
            public_key: public_key.to_string(),
            ip: ip.to_string(),
            location: location.to_string(),
            pending_payout: 0,
        })
    }

    async fn commit_tick(
        &self,
        website_id: &str,
        validator_id: &str,
        status: CheckStatus,
        latency_ms: i64,
        reward: i64,
    ) -> Result<(), StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let tick_id = Uuid::new_v4().to_string();
        let status_str = status.as_str();
        tx.execute(
            "INSERT INTO website_ticks (id, website_id, validator_id, status, latency_ms)
             VALUES ($1, $2, $3, $4, $5)",
            &[&tick_id, &website_id, &validator_id, &status_str, &latency_ms],
        )
        .await?;

        let updated = tx
            .execute(
                "UPDATE validators SET pending_payout = pending_payout + $2 WHERE id = $1",
                &[&validator_id, &reward],
            )
            .await?;

        if updated == 0 {
            // Dropping the transaction rolls the tick back with it
            return Err(StoreError::Database(format!(
                "unknown validator {}",
                validator_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}
