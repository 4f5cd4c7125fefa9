//! End-to-end hub flows driven through the session entry point
//!
//! Sessions are exercised over plain channels instead of sockets: each
//! test validator holds the receiving end of its connection channel and
//! a signing key, and frames are fed to `session::handle_frame` exactly
//! as the WebSocket loop would.

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use uptime_hub::registry::ConnectionHandle;
use uptime_hub::dispatcher::CheckDispatcher;
use uptime_hub::session;
use uptime_hub::signature;
use uptime_hub::store::MemStore;
use uptime_hub::wire::{CheckRequest, CheckResult, CheckStatus, Incoming, Outgoing};
use uptime_hub::{HubConfig, HubState};

const PEER: &str = "203.0.113.7:9100";

struct TestValidator {
    key: SigningKey,
    public_key: String,
    conn: ConnectionHandle,
    rx: mpsc::UnboundedReceiver<String>,
    validator_id: String,
}

impl TestValidator {
    fn sign(&self, message: &str) -> String {
        let sig = self.key.sign(message.as_bytes());
        serde_json::to_string(&sig.to_bytes().to_vec()).unwrap()
    }

    fn next_check_request(&mut self) -> Option<CheckRequest> {
        let frame = self.rx.try_recv().ok()?;
        match serde_json::from_str::<Outgoing>(&frame).unwrap() {
            Outgoing::Validate(req) => Some(req),
            other => panic!("expected check request, got {:?}", other),
        }
    }

    fn reply_frame(&self, req: &CheckRequest, status: CheckStatus, latency: i64) -> String {
        let signed = self.sign(&signature::validate_message(&self.validator_id));
        serde_json::to_string(&Incoming::Validate(CheckResult {
            callback_id: req.callback_id.clone(),
            website_id: req.website_id.clone(),
            validator_id: self.validator_id.clone(),
            status,
            latency,
            signed_message: signed,
        }))
        .unwrap()
    }
}

fn peer() -> SocketAddr {
    PEER.parse().unwrap()
}

fn test_state(store: Arc<MemStore>) -> Arc<HubState> {
    Arc::new(HubState::new(HubConfig::default(), store))
}

/// Sign up a fresh validator and return its live handle plus assigned id
async fn signup(state: &HubState) -> TestValidator {
    let key = SigningKey::generate(&mut OsRng);
    let public_key = bs58::encode(key.verifying_key().to_bytes()).into_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = ConnectionHandle::new(tx);

    let callback_id = Uuid::new_v4().to_string();
    let message = signature::signup_message(&callback_id, &public_key);
    let signed = serde_json::to_string(&key.sign(message.as_bytes()).to_bytes().to_vec()).unwrap();
    let frame = serde_json::to_string(&Incoming::Signup(uptime_hub::wire::SignupRequest {
        callback_id: callback_id.clone(),
        public_key: public_key.clone(),
        signed_message: signed,
        ip: "203.0.113.7".to_string(),
    }))
    .unwrap();

    session::handle_frame(state, &conn, peer(), &frame).await;

    let ack_frame = rx.try_recv().expect("signup ack");
    let validator_id = match serde_json::from_str::<Outgoing>(&ack_frame).unwrap() {
        Outgoing::Signup(ack) => {
            assert_eq!(ack.callback_id, callback_id);
            ack.validator_id
        }
        other => panic!("expected signup ack, got {:?}", other),
    };

    TestValidator {
        key,
        public_key,
        conn,
        rx,
        validator_id,
    }
}

#[tokio::test]
async fn test_signup_creates_identity_and_joins_dispatch() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());

    let mut validator = signup(&state).await;
    assert_eq!(store.validator_count(), 1);
    assert_eq!(state.registry.len(), 1);

    // The new validator appears in the next dispatch cycle
    let stats = CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert!(validator.next_check_request().is_some());
}

#[tokio::test]
async fn test_resignup_reuses_identity() {
    let store = Arc::new(MemStore::new());
    let state = test_state(store.clone());

    let first = signup(&state).await;

    // Same key signs up again over a new connection
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = ConnectionHandle::new(tx);
    let callback_id = Uuid::new_v4().to_string();
    let message = signature::signup_message(&callback_id, &first.public_key);
    let frame = serde_json::to_string(&Incoming::Signup(uptime_hub::wire::SignupRequest {
        callback_id,
        public_key: first.public_key.clone(),
        signed_message: first.sign(&message),
        ip: "203.0.113.8".to_string(),
    }))
    .unwrap();
    session::handle_frame(&state, &conn, peer(), &frame).await;

    let ack = rx.try_recv().expect("signup ack");
    match serde_json::from_str::<Outgoing>(&ack).unwrap() {
        Outgoing::Signup(ack) => assert_eq!(ack.validator_id, first.validator_id),
        other => panic!("expected signup ack, got {:?}", other),
    }
    // No second identity, and the registry deduped by validator id
    assert_eq!(store.validator_count(), 1);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn test_unsigned_signup_dropped_silently() {
    let store = Arc::new(MemStore::new());
    let state = test_state(store.clone());

    let key = SigningKey::generate(&mut OsRng);
    let public_key = bs58::encode(key.verifying_key().to_bytes()).into_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = ConnectionHandle::new(tx);

    // Signature produced by a different key
    let imposter = SigningKey::generate(&mut OsRng);
    let callback_id = Uuid::new_v4().to_string();
    let message = signature::signup_message(&callback_id, &public_key);
    let signed =
        serde_json::to_string(&imposter.sign(message.as_bytes()).to_bytes().to_vec()).unwrap();
    let frame = serde_json::to_string(&Incoming::Signup(uptime_hub::wire::SignupRequest {
        callback_id,
        public_key,
        signed_message: signed,
        ip: "203.0.113.7".to_string(),
    }))
    .unwrap();

    session::handle_frame(&state, &conn, peer(), &frame).await;

    // No reply, no identity, no registry entry
    assert!(rx.try_recv().is_err());
    assert_eq!(store.validator_count(), 0);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_verified_result_commits_tick_and_payout() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let mut validator = signup(&state).await;

    let stats = CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    assert_eq!(stats.dispatched, 1);

    let req = validator.next_check_request().unwrap();
    let reply = validator.reply_frame(&req, CheckStatus::Good, 120);
    session::handle_frame(&state, &validator.conn, peer(), &reply).await;

    let ticks = store.ticks();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].website_id, "site-1");
    assert_eq!(ticks[0].validator_id, validator.validator_id);
    assert_eq!(ticks[0].status, CheckStatus::Good);
    assert_eq!(ticks[0].latency_ms, 120);
    assert_eq!(store.pending_payout(&validator.validator_id), Some(100));
    // Token consumed
    assert!(state.correlation.is_empty());
}

#[tokio::test]
async fn test_negative_latency_rejected() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let mut validator = signup(&state).await;

    CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    let req = validator.next_check_request().unwrap();

    // Properly signed, but the latency is nonsense
    let reply = validator.reply_frame(&req, CheckStatus::Good, -5);
    session::handle_frame(&state, &validator.conn, peer(), &reply).await;

    assert!(store.ticks().is_empty());
    assert_eq!(store.pending_payout(&validator.validator_id), Some(0));
}

#[tokio::test]
async fn test_forged_result_rejected_and_token_consumed() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let mut validator = signup(&state).await;

    CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    let req = validator.next_check_request().unwrap();

    // Signed by a key other than the one the check was dispatched to,
    // while naming the real validator's id
    let forger = SigningKey::generate(&mut OsRng);
    let signed = serde_json::to_string(
        &forger
            .sign(signature::validate_message(&validator.validator_id).as_bytes())
            .to_bytes()
            .to_vec(),
    )
    .unwrap();
    let forged = serde_json::to_string(&Incoming::Validate(CheckResult {
        callback_id: req.callback_id.clone(),
        website_id: req.website_id.clone(),
        validator_id: validator.validator_id.clone(),
        status: CheckStatus::Good,
        latency: 1,
        signed_message: signed,
    }))
    .unwrap();

    session::handle_frame(&state, &validator.conn, peer(), &forged).await;
    assert!(store.ticks().is_empty());
    assert_eq!(store.pending_payout(&validator.validator_id), Some(0));
    assert!(state.correlation.is_empty());

    // Retrying the same token, even correctly signed, is now a no-op
    let correct = validator.reply_frame(&req, CheckStatus::Good, 120);
    session::handle_frame(&state, &validator.conn, peer(), &correct).await;
    assert!(store.ticks().is_empty());
    assert_eq!(store.pending_payout(&validator.validator_id), Some(0));
}

#[tokio::test]
async fn test_duplicate_reply_credits_once() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let mut validator = signup(&state).await;

    CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    let req = validator.next_check_request().unwrap();
    let reply = validator.reply_frame(&req, CheckStatus::Good, 80);

    session::handle_frame(&state, &validator.conn, peer(), &reply).await;
    session::handle_frame(&state, &validator.conn, peer(), &reply).await;

    assert_eq!(store.ticks().len(), 1);
    assert_eq!(store.pending_payout(&validator.validator_id), Some(100));
}

#[tokio::test]
async fn test_independent_replies_any_order() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let mut v1 = signup(&state).await;
    let mut v2 = signup(&state).await;

    let stats = CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    assert_eq!(stats.dispatched, 2);

    let req1 = v1.next_check_request().unwrap();
    let req2 = v2.next_check_request().unwrap();
    assert_ne!(req1.callback_id, req2.callback_id);

    // Arrival order reversed relative to dispatch order
    let reply2 = v2.reply_frame(&req2, CheckStatus::Bad, 5000);
    session::handle_frame(&state, &v2.conn, peer(), &reply2).await;
    let reply1 = v1.reply_frame(&req1, CheckStatus::Good, 45);
    session::handle_frame(&state, &v1.conn, peer(), &reply1).await;

    assert_eq!(store.ticks().len(), 2);
    assert_eq!(store.pending_payout(&v1.validator_id), Some(100));
    assert_eq!(store.pending_payout(&v2.validator_id), Some(100));
}

#[tokio::test]
async fn test_disconnect_before_reply() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let gone = signup(&state).await;
    let mut remaining = signup(&state).await;

    CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();

    // The first validator disconnects before replying
    state.registry.remove_connection(gone.conn.id());
    drop(gone.rx);
    assert_eq!(state.registry.len(), 1);

    // Only the remaining validator's reply lands
    let req = remaining.next_check_request().unwrap();
    let reply = remaining.reply_frame(&req, CheckStatus::Good, 33);
    session::handle_frame(&state, &remaining.conn, peer(), &reply).await;
    assert_eq!(store.ticks().len(), 1);

    // Next cycle re-dispatches to whoever is still connected
    let stats = CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    assert_eq!(stats.validators, 1);
    assert_eq!(stats.dispatched, 1);
    assert!(remaining.next_check_request().is_some());

    // The abandoned entry is reclaimed once it ages past the TTL
    let swept = state.correlation.sweep_expired(Duration::ZERO);
    assert!(swept >= 1);
    assert!(state.correlation.timed_out() >= 1);
}

#[tokio::test]
async fn test_commit_failure_is_contained() {
    let store = Arc::new(MemStore::new());
    store.add_website("site-1", "https://example.com");
    let state = test_state(store.clone());
    let mut validator = signup(&state).await;

    CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    let req = validator.next_check_request().unwrap();

    store.fail_commits(true);
    let reply = validator.reply_frame(&req, CheckStatus::Good, 10);
    session::handle_frame(&state, &validator.conn, peer(), &reply).await;

    // Result lost for this cycle; no partial effect, session unaffected
    assert!(store.ticks().is_empty());
    assert_eq!(store.pending_payout(&validator.validator_id), Some(0));

    // The next cycle issues a fresh check and it settles normally
    store.fail_commits(false);
    CheckDispatcher::new(state.clone()).dispatch_cycle().await.unwrap();
    let req = validator.next_check_request().unwrap();
    let reply = validator.reply_frame(&req, CheckStatus::Good, 10);
    session::handle_frame(&state, &validator.conn, peer(), &reply).await;
    assert_eq!(store.ticks().len(), 1);
}

#[tokio::test]
async fn test_garbage_frames_ignored() {
    let store = Arc::new(MemStore::new());
    let state = test_state(store.clone());
    let (tx, _rx) = mpsc::unbounded_channel();
    let conn = ConnectionHandle::new(tx);

    session::handle_frame(&state, &conn, peer(), "not json").await;
    session::handle_frame(&state, &conn, peer(), "{}").await;
    session::handle_frame(&state, &conn, peer(), r#"{"type":"selfdestruct","data":{}}"#).await;

    assert!(state.registry.is_empty());
    assert!(store.ticks().is_empty());
}
