//! Hub server assembly
//!
//! Owns the shared state (registry, correlation table, store handle) and
//! exposes the WebSocket endpoint validators connect to, plus a health
//! endpoint reporting live counters.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HubConfig;
use crate::correlation::CorrelationTable;
use crate::registry::ValidatorRegistry;
use crate::session;
use crate::store::Store;

/// Shared application state, constructed once at startup and passed by
/// reference to the session handlers and the dispatcher
pub struct HubState {
    pub config: HubConfig,
    pub registry: ValidatorRegistry,
    pub correlation: CorrelationTable,
    pub store: Arc<dyn Store>,
}

impl HubState {
    pub fn new(config: HubConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            registry: ValidatorRegistry::new(),
            correlation: CorrelationTable::new(),
            store,
        }
    }
}

pub struct HubServer {
    state: Arc<HubState>,
}

impl HubServer {
    pub fn new(state: Arc<HubState>) -> Self {
        Self { state }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", any(session::ws_handler))
            .route("/health", get(health_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
    }

    /// Bind and serve until shutdown
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let router = self.router();

        info!("Uptime hub listening on {}", addr);
        info!("  - WebSocket: ws://{}/", addr);
        info!("  - Health: http://{}/health", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

/// Liveness plus the counters that matter operationally
async fn health_handler(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "connected_validators": state.registry.len(),
            "in_flight_checks": state.correlation.len(),
            "timed_out_checks": state.correlation.timed_out(),
        })),
    )
}
