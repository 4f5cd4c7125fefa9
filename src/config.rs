//! Hub configuration
//!
//! Deployment parameters are constants with environment/flag overrides in
//! the binary; there is no runtime reconfiguration.

use std::time::Duration;

/// Default WebSocket listen port
pub const DEFAULT_PORT: u16 = 8081;

/// Default seconds between dispatch cycles
pub const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 60;

/// Default payout per verified check, in the smallest payment unit
pub const DEFAULT_COST_PER_VALIDATION: i64 = 100;

/// Default seconds a dispatched check may await its reply before the
/// correlation entry is reclaimed as a timeout
pub const DEFAULT_CALLBACK_TTL_SECS: u64 = 600;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Period of the check dispatch loop
    pub dispatch_interval: Duration,
    /// TTL for unresolved correlation entries
    pub callback_ttl: Duration,
    /// Credit per accepted, signature-verified result
    pub cost_per_validation: i64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_secs(DEFAULT_DISPATCH_INTERVAL_SECS),
            callback_ttl: Duration::from_secs(DEFAULT_CALLBACK_TTL_SECS),
            cost_per_validation: DEFAULT_COST_PER_VALIDATION,
        }
    }
}
