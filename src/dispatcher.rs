//! Periodic check dispatcher
//!
//! On a fixed cadence, fans out one correlated check request per
//! (enabled site, connected validator) pair. Each cycle is independent:
//! the site list and validator snapshot are re-read fresh, so a
//! validator that missed a cycle (disconnect, failed send) is naturally
//! retried on the next one.

use std::sync::Arc;
use std::time::Instant;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::correlation::PendingCheck;
use crate::server::HubState;
use crate::store::StoreError;
use crate::wire::{CheckRequest, Outgoing};

/// Per-cycle outcome, for logging and tests
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub sites: usize,
    pub validators: usize,
    pub dispatched: usize,
    pub send_failures: usize,
    pub expired: usize,
}

pub struct CheckDispatcher {
    state: Arc<HubState>,
}

impl CheckDispatcher {
    pub fn new(state: Arc<HubState>) -> Self {
        Self { state }
    }

    /// Run forever at the configured period
    pub async fn run(self) {
        let mut ticker = interval(self.state.config.dispatch_interval);
        ticker.tick().await; // Skip first tick so validators can sign up

        loop {
            ticker.tick().await;

            match self.dispatch_cycle().await {
                Ok(stats) => {
                    info!(
                        "Dispatch cycle: {} sites x {} validators, {} sent, {} send failures, {} timed out",
                        stats.sites, stats.validators, stats.dispatched, stats.send_failures, stats.expired
                    );
                }
                Err(e) => {
                    // Store unavailable; the next cycle retries
                    warn!("Dispatch cycle skipped: {}", e);
                }
            }
        }
    }

    /// Execute one dispatch cycle
    pub async fn dispatch_cycle(&self) -> Result<DispatchStats, StoreError> {
        let mut stats = DispatchStats {
            expired: self
                .state
                .correlation
                .sweep_expired(self.state.config.callback_ttl),
            ..Default::default()
        };
        if stats.expired > 0 {
            warn!("{} checks timed out without a reply", stats.expired);
        }

        let sites = self.state.store.list_enabled_sites().await?;
        let validators = self.state.registry.snapshot();
        stats.sites = sites.len();
        stats.validators = validators.len();

        for site in &sites {
            for validator in &validators {
                let callback_id = Uuid::new_v4().to_string();
                let pending = PendingCheck {
                    validator_id: validator.validator_id.clone(),
                    public_key: validator.public_key.clone(),
                    website_id: site.id.clone(),
                    website_url: site.url.clone(),
                    connection_id: validator.connection.id(),
                    dispatched_at: Instant::now(),
                };

                if let Err(e) = self.state.correlation.register(&callback_id, pending) {
                    error!("Callback token collision: {}", e);
                    continue;
                }

                let request = Outgoing::Validate(CheckRequest {
                    url: site.url.clone(),
                    callback_id,
                    website_id: site.id.clone(),
                });
                let frame = match serde_json::to_string(&request) {
                    Ok(f) => f,
                    Err(e) => {
                        error!("Failed to serialize check request: {}", e);
                        continue;
                    }
                };

                if validator.connection.send(frame).is_err() {
                    // Connection closed mid-send; the orphaned entry ages
                    // out via the TTL sweep
                    debug!(
                        "Send to validator {} failed, connection closed",
                        validator.validator_id
                    );
                    stats.send_failures += 1;
                    continue;
                }

                stats.dispatched += 1;
            }
        }

        Ok(stats)
    }
}
