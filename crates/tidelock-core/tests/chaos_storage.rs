//! Chaos property tests for the authentication pipeline
//!
//! Runs the pipeline over `ChaoticStorage` and checks that injected storage
//! faults always fail closed:
//! - A request is accepted only if its nonce ended up recorded
//! - No nonce is ever accepted twice
//! - Rejected requests leave no nonce behind
//! - Rate-limit hits never exceed accepted requests

use std::{collections::HashSet, sync::Arc};

use proptest::prelude::*;
use serde_json::json;
use tidelock_core::{
    AuthContext, AuthError, ChaoticStorage, ClientSession, CredentialIssuer, InboundRequest,
    ManualEnv, MemoryStorage, RequestAuthenticator, SecurityPolicy, Storage, UserId,
};
use tidelock_crypto::{SeedVault, VaultKey};

const T0: u64 = 1_710_000_000_000;
const W0: i64 = 57_000_000;
const USER: UserId = UserId(7);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_faults_fail_closed(
        chaos_seed in any::<u64>(),
        failure_rate in 0.0f64..0.6,
        plan in proptest::collection::vec(0usize..24, 1..80),
    ) {
        let env = ManualEnv::new(T0, chaos_seed);
        let vault = Arc::new(SeedVault::new(VaultKey::from_bytes([3; 32])));
        let inner = MemoryStorage::new();
        let policy = SecurityPolicy::default();

        let issued = CredentialIssuer::new(env.clone(), vault.clone()).rotate(&inner, USER).unwrap();
        let client = ClientSession::from_credentials(&issued, &policy);
        let auth = RequestAuthenticator::new(env, vault, policy).unwrap();

        let storage = ChaoticStorage::with_seed(inner.clone(), failure_rate, chaos_seed);
        let ctx = AuthContext::new(&storage, USER);

        let mut accepted = HashSet::new();
        for (i, nonce_id) in plan.into_iter().enumerate() {
            let nonce = format!("nonce-{nonce_id}");
            let iv = [i as u8; 16];
            let body = client.seal_request(&json!({"i": i}), W0, nonce.clone(), iv).unwrap().to_json();

            match auth.authenticate(&ctx, &InboundRequest::new(body.as_bytes())) {
                Ok(request) => {
                    prop_assert_eq!(request.nonce.as_deref(), Some(nonce.as_str()));
                    prop_assert!(accepted.insert(nonce.clone()), "nonce accepted twice: {}", nonce);
                },
                Err(AuthError::ReplayDetected) => {
                    prop_assert!(accepted.contains(&nonce));
                },
                Err(AuthError::Storage(_)) => {
                    prop_assert_eq!(
                        inner.contains_nonce(USER, &nonce).unwrap(),
                        accepted.contains(&nonce)
                    );
                },
                Err(other) => prop_assert!(false, "unexpected rejection: {:?}", other),
            }
        }

        prop_assert_eq!(inner.nonce_count().unwrap(), accepted.len());
        prop_assert!(inner.hit_count().unwrap() <= accepted.len());
    }
}

#[test]
fn total_outage_rejects_everything() {
    let env = ManualEnv::new(T0, 1);
    let vault = Arc::new(SeedVault::new(VaultKey::from_bytes([3; 32])));
    let inner = MemoryStorage::new();
    let policy = SecurityPolicy::default();

    let issued = CredentialIssuer::new(env.clone(), vault.clone()).rotate(&inner, USER).unwrap();
    let client = ClientSession::from_credentials(&issued, &policy);
    let auth = RequestAuthenticator::new(env, vault, policy).unwrap();

    let storage = ChaoticStorage::new(inner.clone(), 1.0);
    let body = client.seal_request(&json!({}), W0, "n", [0; 16]).unwrap().to_json();

    let err = auth
        .authenticate(&AuthContext::new(&storage, USER), &InboundRequest::new(body.as_bytes()))
        .unwrap_err();
    assert_eq!(err.http_status(), 503);
    assert_eq!(inner.nonce_count().unwrap(), 0);
    assert!(storage.injected_failures() > 0);
}
