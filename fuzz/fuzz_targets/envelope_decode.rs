//! Fuzz target for envelope parsing and payload opening
//!
//! Feeds arbitrary bytes through every parser an untrusted body touches
//! before the authenticator has verified anything.
//!
//! # Strategy
//!
//! - Raw bytes as request and response JSON bodies
//! - Raw text as the `encrypted` field and as the MAC tag
//! - A fixed session key, so MAC checks and decryption run on real key
//!   material
//!
//! # Invariants
//!
//! - Parsing NEVER panics, whatever the input
//! - A parsed request re-encodes to JSON that parses back to the same
//!   envelope
//! - MAC verification of arbitrary text against arbitrary tags NEVER panics
//! - Decryption of arbitrary text NEVER panics
//! - Recovered plaintext is always shorter than the IV-stripped ciphertext

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidelock_core::{RequestEnvelope, ResponseEnvelope, SecurityPolicy};
use tidelock_crypto::{IV_LEN, MasterSeed, decrypt_payload, derive_session_key, verify_envelope};

#[derive(Debug, Arbitrary)]
struct Input {
    /// Raw request or response body
    body: Vec<u8>,
    /// Candidate `encrypted` field
    encrypted: String,
    /// Candidate MAC tag
    tag: String,
    /// Window to derive the key for
    window: i64,
}

fuzz_target!(|input: Input| {
    let policy = SecurityPolicy::default();

    if let Ok(envelope) = RequestEnvelope::from_json(&input.body) {
        let _ = envelope.validate(&policy);

        let reparsed = RequestEnvelope::from_json(envelope.to_json().as_bytes())
            .expect("re-encoded envelope must parse");
        assert_eq!(reparsed, envelope);
    }

    if let Ok(response) = ResponseEnvelope::from_json(&input.body) {
        let _ = response.to_json();
    }

    let Ok(seed) = MasterSeed::from_hex("0123456789abcdef".repeat(8)) else {
        return;
    };
    let key = derive_session_key(&seed, b"fuzz-salt", "tidelock_v1", input.window);

    let _ = verify_envelope(&key, &input.encrypted, &input.tag);

    if let Ok(plaintext) = decrypt_payload(&input.encrypted, &key) {
        // IV plus at least one padding byte were stripped
        assert!(plaintext.len() + IV_LEN < input.encrypted.len());
    }
});
