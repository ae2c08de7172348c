//! Fuzz target for the request authentication pipeline
//!
//! Drives a `RequestAuthenticator` on a manual clock with a mix of genuine
//! client requests, mutated copies of them and raw garbage bodies.
//!
//! # Strategy
//!
//! - Genuine requests sealed by a `ClientSession` for a fuzzed window offset
//! - Mutations: flipped ciphertext characters, swapped MAC, replayed nonce
//! - Raw bodies and arbitrary header sets
//! - Clock jumps between operations
//!
//! # Invariants
//!
//! - The authenticator NEVER panics
//! - Only bodies carrying a MAC produced with the user's key are accepted
//! - An accepted nonce is never accepted a second time
//! - A genuine request inside the tolerance with a fresh nonce is accepted
//!   unless the rate limit is exhausted

#![no_main]

use std::{collections::HashSet, sync::Arc, time::Duration};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::json;
use tidelock_core::{
    AuthContext, AuthError, ClientSession, CredentialIssuer, Environment, InboundRequest,
    ManualEnv, MemoryStorage, RequestAuthenticator, RequestEnvelope, SecurityPolicy, UserId,
};
use tidelock_crypto::{SeedVault, VaultKey, window_at};

const START_MS: u64 = 1_710_000_000_000;
const USER: UserId = UserId(42);

#[derive(Debug, Arbitrary)]
struct Scenario {
    env_seed: u64,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    /// Seal a real request
    Genuine { window_offset: i8, nonce: u16, iv: [u8; 16] },
    /// Seal a real request, then corrupt one character of the ciphertext
    FlipCiphertext { nonce: u16, position: u16 },
    /// Seal a real request, then replace its MAC
    ForeignMac { nonce: u16, hmac: String },
    /// Replay the last accepted request verbatim
    ReplayLast,
    /// Arbitrary body and headers
    Raw { body: Vec<u8>, headers: Vec<(String, String)> },
    /// Move the clock forward
    Advance { seconds: u16 },
}

fuzz_target!(|scenario: Scenario| {
    let env = ManualEnv::new(START_MS, scenario.env_seed);
    let vault = Arc::new(SeedVault::new(VaultKey::from_bytes([9; 32])));
    let storage = MemoryStorage::new();
    let policy = SecurityPolicy::default();

    let Ok(issued) = CredentialIssuer::new(env.clone(), vault.clone()).rotate(&storage, USER)
    else {
        return;
    };
    let client = ClientSession::from_credentials(&issued, &policy);
    let Ok(auth) = RequestAuthenticator::new(env.clone(), vault, policy.clone()) else {
        return;
    };
    let ctx = AuthContext::new(&storage, USER);

    let mut accepted_nonces = HashSet::new();
    let mut last_accepted: Option<String> = None;

    for op in scenario.operations.into_iter().take(64) {
        match op {
            Operation::Genuine { window_offset, nonce, iv } => {
                let now = env.wall_clock_millis();
                let window = window_at(now, policy.window_size_ms) + i64::from(window_offset);
                let nonce = format!("n-{nonce}");
                let envelope = seal(&client, window, &nonce, iv);
                let body = envelope.to_json();

                let result = auth.authenticate(&ctx, &InboundRequest::new(body.as_bytes()));
                let within = i64::from(window_offset).unsigned_abs()
                    <= u64::from(policy.window_tolerance);

                match result {
                    Ok(request) => {
                        assert!(within, "accepted window outside tolerance");
                        assert!(accepted_nonces.insert(nonce), "nonce accepted twice");
                        assert_eq!(request.payload, json!({"op": "fuzz"}));
                        last_accepted = Some(body);
                    },
                    Err(AuthError::ReplayDetected) => {
                        assert!(accepted_nonces.contains(&nonce));
                    },
                    Err(AuthError::RateLimited { .. }) => {},
                    Err(AuthError::WindowExpired { .. }) => assert!(!within),
                    Err(e) => panic!("genuine request rejected: {e}"),
                }
            },
            Operation::FlipCiphertext { nonce, position } => {
                let now = env.wall_clock_millis();
                let window = window_at(now, policy.window_size_ms);
                let mut envelope = seal(&client, window, &format!("f-{nonce}"), [1; 16]);

                let bytes = envelope.encrypted.as_bytes();
                let index = usize::from(position) % bytes.len();
                let replacement = if bytes[index] == b'A' { "B" } else { "A" };
                envelope.encrypted.replace_range(index..=index, replacement);

                let body = envelope.to_json();
                let result = auth.authenticate(&ctx, &InboundRequest::new(body.as_bytes()));
                assert!(result.is_err(), "tampered ciphertext accepted");
            },
            Operation::ForeignMac { nonce, hmac } => {
                let now = env.wall_clock_millis();
                let window = window_at(now, policy.window_size_ms);
                let mut envelope = seal(&client, window, &format!("m-{nonce}"), [2; 16]);
                if envelope.hmac.eq_ignore_ascii_case(&hmac) {
                    continue;
                }
                envelope.hmac = hmac;

                let body = envelope.to_json();
                let result = auth.authenticate(&ctx, &InboundRequest::new(body.as_bytes()));
                assert!(result.is_err(), "foreign MAC accepted");
            },
            Operation::ReplayLast => {
                if let Some(body) = &last_accepted {
                    let result = auth.authenticate(&ctx, &InboundRequest::new(body.as_bytes()));
                    assert!(result.is_err(), "replayed request accepted");
                }
            },
            Operation::Raw { body, headers } => {
                let pairs: Vec<(&str, &str)> =
                    headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                let request = InboundRequest::with_headers(&pairs, &body);

                if let Ok(accepted) = auth.authenticate(&ctx, &request) {
                    // Only a body copied from a genuine request can pass
                    assert!(accepted_nonces.insert(accepted.nonce.unwrap_or_default()));
                }
            },
            Operation::Advance { seconds } => {
                env.advance(Duration::from_secs(u64::from(seconds)));
            },
        }
    }
});

fn seal(client: &ClientSession, window: i64, nonce: &str, iv: [u8; 16]) -> RequestEnvelope {
    match client.seal_request(&json!({"op": "fuzz"}), window, nonce, iv) {
        Ok(envelope) => envelope,
        Err(e) => panic!("sealing a JSON literal failed: {e}"),
    }
}
