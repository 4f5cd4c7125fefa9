//! Uptime Hub
//!
//! Coordinator for a pool of untrusted, remotely operated validator
//! nodes that perform website uptime checks. Validators connect over a
//! persistent WebSocket, prove key ownership at signup, receive
//! correlated check requests on a fixed cadence, and are credited for
//! every signature-verified result.
//!
//! ## Module Structure
//!
//! - `signature`: Ed25519 verification and canonical message builders
//! - `wire`: JSON wire protocol messages
//! - `registry`: live directory of connected validators
//! - `correlation`: single-use token table matching requests to replies
//! - `dispatcher`: periodic fan-out of check requests
//! - `session`: per-connection WebSocket message pump
//! - `store`: durable storage (postgres ledger, in-memory twin)
//! - `server`: state assembly and HTTP/WebSocket surface
//! - `config`: deployment constants

pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod session;
pub mod signature;
pub mod store;
pub mod wire;

pub use config::HubConfig;
pub use server::{HubServer, HubState};
