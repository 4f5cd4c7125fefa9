//! Uptime hub binary
//!
//! Wires the postgres store, validator registry, correlation table, and
//! dispatcher together and serves the validator WebSocket endpoint.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use uptime_hub::config::{
    DEFAULT_CALLBACK_TTL_SECS, DEFAULT_COST_PER_VALIDATION, DEFAULT_DISPATCH_INTERVAL_SECS,
};
use uptime_hub::dispatcher::CheckDispatcher;
use uptime_hub::store::PgStore;
use uptime_hub::{HubConfig, HubServer, HubState};

#[derive(Parser, Debug)]
#[command(name = "uptime-hub", about = "Coordinator hub for website uptime validators")]
struct Cli {
    /// WebSocket/HTTP listen address
    #[arg(long, env = "HUB_BIND", default_value = "0.0.0.0:8081")]
    bind: SocketAddr,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Seconds between dispatch cycles
    #[arg(long, env = "DISPATCH_INTERVAL_SECS", default_value_t = DEFAULT_DISPATCH_INTERVAL_SECS)]
    dispatch_interval_secs: u64,

    /// Seconds an unresolved check waits before it is reclaimed as a timeout
    #[arg(long, env = "CALLBACK_TTL_SECS", default_value_t = DEFAULT_CALLBACK_TTL_SECS)]
    callback_ttl_secs: u64,

    /// Payout per verified check, in the smallest payment unit
    #[arg(long, env = "COST_PER_VALIDATION", default_value_t = DEFAULT_COST_PER_VALIDATION)]
    cost_per_validation: i64,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Uptime hub starting");
    info!("  Bind address: {}", cli.bind);
    info!("  Dispatch interval: {}s", cli.dispatch_interval_secs);
    info!("  Callback TTL: {}s", cli.callback_ttl_secs);
    info!("  Cost per validation: {}", cli.cost_per_validation);

    let config = HubConfig {
        dispatch_interval: Duration::from_secs(cli.dispatch_interval_secs),
        callback_ttl: Duration::from_secs(cli.callback_ttl_secs),
        cost_per_validation: cli.cost_per_validation,
    };

    let store = PgStore::new(&cli.database_url).await?;
    let state = Arc::new(HubState::new(config, Arc::new(store)));

    let dispatcher = CheckDispatcher::new(state.clone());
    tokio::spawn(dispatcher.run());

    HubServer::new(state).run(cli.bind).await
}
