//! Fuzz target for authentication under storage failures
//!
//! Wraps `MemoryStorage` in `ChaoticStorage` and sends genuine requests
//! while storage operations fail at a fuzzed rate.
//!
//! # Strategy
//!
//! - Failure rates from 0% to 90%
//! - Genuine requests with fresh and repeated nonces
//! - Periodic sweeps through the same failing storage
//!
//! # Invariants
//!
//! - Storage faults surface as `AuthError::Storage`, never as panics
//! - A storage fault never lets a nonce through twice within the replay
//!   horizon
//! - A request rejected for any reason leaves no nonce behind

#![no_main]

use std::{collections::HashMap, sync::Arc, time::Duration};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::json;
use tidelock_core::{
    AuthContext, AuthError, ChaoticStorage, ClientSession, CredentialIssuer, Environment,
    InboundRequest, ManualEnv, MemoryStorage, RequestAuthenticator, SecurityPolicy, Storage,
    Sweeper, UserId,
};
use tidelock_crypto::{SeedVault, VaultKey, window_at};

const START_MS: u64 = 1_710_000_000_000;
const USER: UserId = UserId(7);

#[derive(Debug, Arbitrary)]
struct ChaosScenario {
    /// Seed for ChaoticStorage failure decisions
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<ChaosOperation>,
}

#[derive(Debug, Arbitrary)]
enum ChaosOperation {
    Send { nonce: u8 },
    Sweep,
    Advance { seconds: u8 },
}

fuzz_target!(|scenario: ChaosScenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;

    let env = ManualEnv::new(START_MS, scenario.chaos_seed);
    let vault = Arc::new(SeedVault::new(VaultKey::from_bytes([3; 32])));
    let policy = SecurityPolicy::default();

    let inner = MemoryStorage::new();
    let Ok(issued) = CredentialIssuer::new(env.clone(), vault.clone()).rotate(&inner, USER) else {
        return;
    };
    let storage = ChaoticStorage::with_seed(inner, failure_rate, scenario.chaos_seed);

    let client = ClientSession::from_credentials(&issued, &policy);
    let Ok(auth) = RequestAuthenticator::new(env.clone(), vault, policy.clone()) else {
        return;
    };
    let Ok(sweeper) = Sweeper::from_policy(&policy) else {
        return;
    };
    let ctx = AuthContext::new(&storage, USER);

    let horizon_ms = u64::try_from(policy.replay_horizon().as_millis()).unwrap_or(u64::MAX);
    let mut accepted: HashMap<String, u64> = HashMap::new();

    for op in scenario.operations.into_iter().take(64) {
        match op {
            ChaosOperation::Send { nonce } => {
                let nonce = format!("c-{nonce}");
                let now = env.wall_clock_millis();
                let window = window_at(now, policy.window_size_ms);
                let Ok(envelope) = client.seal_request(&json!({"n": 1}), window, &nonce, [5; 16])
                else {
                    return;
                };
                let body = envelope.to_json();

                match auth.authenticate(&ctx, &InboundRequest::new(body.as_bytes())) {
                    Ok(_) => {
                        if let Some(first) = accepted.insert(nonce, now) {
                            assert!(now - first >= horizon_ms, "nonce accepted twice under chaos");
                        }
                    },
                    Err(AuthError::Storage(_) | AuthError::RateLimited { .. }) => {
                        if !accepted.contains_key(&nonce) {
                            let stored = storage.inner().contains_nonce(USER, &nonce);
                            assert_eq!(stored, Ok(false), "rejected request left its nonce");
                        }
                    },
                    Err(AuthError::ReplayDetected) => {
                        assert!(accepted.contains_key(&nonce));
                    },
                    Err(e) => panic!("unexpected rejection under chaos: {e}"),
                }
            },
            ChaosOperation::Sweep => {
                let _ = sweeper.sweep_once(&storage, env.wall_clock_millis());
            },
            ChaosOperation::Advance { seconds } => {
                env.advance(Duration::from_secs(u64::from(seconds)));
            },
        }
    }
});
