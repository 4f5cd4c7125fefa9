//! Signature verification for validator messages
//!
//! Provides:
//! - Detached Ed25519 verification against base58-encoded public keys
//! - Canonical message builders for signup and validation claims
//!
//! Validators sign the exact UTF-8 bytes of the canonical strings below.
//! Any deviation on the signer side is indistinguishable from forgery and
//! is rejected.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::debug;

// ============================================================================
// MESSAGE CREATION HELPERS
// ============================================================================

/// Create the message a validator signs when signing up
pub fn signup_message(callback_id: &str, public_key: &str) -> String {
    format!("Signup message from {} {}", callback_id, public_key)
}

/// Create the message a validator signs over a check result
pub fn validate_message(validator_id: &str) -> String {
    format!("Validate message from {}", validator_id)
}

// ============================================================================
// SIGNATURE VERIFICATION
// ============================================================================

/// Verify a detached Ed25519 signature over the UTF-8 bytes of `message`.
///
/// # Arguments
/// * `message` - The plaintext that was signed
/// * `public_key_b58` - Base58-encoded 32-byte verification key
/// * `signed_message` - Signature bytes as a JSON array string (`"[12,34,...]"`),
///   the encoding validator nodes put on the wire
///
/// Fails closed: any malformed key, malformed signature, or mismatch
/// returns `false`. Never panics on peer-supplied input.
pub fn verify_signature(message: &str, public_key_b58: &str, signed_message: &str) -> bool {
    let key_bytes = match bs58::decode(public_key_b58).into_vec() {
        Ok(b) => b,
        Err(e) => {
            debug!("Failed to decode base58 public key: {}", e);
            return false;
        }
    };

    let key_array: [u8; 32] = match key_bytes.as_slice().try_into() {
        Ok(a) => a,
        Err(_) => {
            debug!(
                "Invalid public key length: {} (expected 32)",
                key_bytes.len()
            );
            return false;
        }
    };

    let verifying_key = match VerifyingKey::from_bytes(&key_array) {
        Ok(k) => k,
        Err(e) => {
            debug!("Invalid Ed25519 public key: {}", e);
            return false;
        }
    };

    let sig_bytes: Vec<u8> = match serde_json::from_str(signed_message) {
        Ok(b) => b,
        Err(e) => {
            debug!("Failed to parse signature byte array: {}", e);
            return false;
        }
    };

    let sig_array: [u8; 64] = match sig_bytes.as_slice().try_into() {
        Ok(a) => a,
        Err(_) => {
            debug!("Invalid signature length: {} (expected 64)", sig_bytes.len());
            return false;
        }
    };

    let signature = Signature::from_bytes(&sig_array);
    let is_valid = verifying_key.verify(message.as_bytes(), &signature).is_ok();

    if !is_valid {
        // Char-boundary truncation; the message embeds peer-supplied ids
        // which may be multibyte UTF-8.
        let preview: String = message.chars().take(50).collect();
        debug!("Signature verification failed for message '{}'", preview);
    }

    is_valid
}
