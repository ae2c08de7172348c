//! Request authentication pipeline.
//!
//! Every inbound request walks the same stages in order and stops at the
//! first failure:
//!
//! ```text
//! RECEIVED → RATE_CHECKED → WINDOW_VALIDATED → KEY_DERIVED
//!          → HMAC_VALIDATED → NONCE_CHECKED → DECRYPTED → DELIVERED
//! ```
//!
//! Cheap checks run before key derivation, and the MAC is verified before the
//! nonce is touched, so unauthenticated traffic can neither burn a
//! legitimate client's nonces nor its rate budget. A nonce consumed at
//! `NONCE_CHECKED` is released again if decryption fails, and the rate-limit
//! hit is only recorded at `DELIVERED`.

use std::{fmt, sync::Arc};

use serde::Serialize;
use tidelock_crypto::{
    IV_LEN, SeedVault, SessionKey, Window, decrypt_payload, derive_session_key,
    encrypt_payload, sign_envelope, verify_envelope, window_at, within_tolerance,
};
use tracing::{debug, error, warn};

use crate::{
    env::Environment,
    envelope::{RequestEnvelope, ResponseEnvelope, Status},
    error::AuthError,
    policy::{PolicyError, SecurityPolicy},
    rate_limit::{RateDecision, RateLimitUsage, RateLimiter},
    replay::ReplayGuard,
    storage::Storage,
    types::UserId,
};

/// Pipeline stage reached by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthStage {
    /// Body parsed and structurally valid.
    Received,
    /// Under both rate budgets.
    RateChecked,
    /// Declared window within tolerance.
    WindowValidated,
    /// Session key derived for the declared window.
    KeyDerived,
    /// Envelope MAC verified.
    HmacValidated,
    /// Nonce consumed.
    NonceChecked,
    /// Payload decrypted and parsed.
    Decrypted,
    /// Handed to the application.
    Delivered,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::RateChecked => "RATE_CHECKED",
            Self::WindowValidated => "WINDOW_VALIDATED",
            Self::KeyDerived => "KEY_DERIVED",
            Self::HmacValidated => "HMAC_VALIDATED",
            Self::NonceChecked => "NONCE_CHECKED",
            Self::Decrypted => "DECRYPTED",
            Self::Delivered => "DELIVERED",
        };
        f.write_str(name)
    }
}

/// Who the request claims to come from and where their state lives.
///
/// The user id comes from the surrounding session layer; the envelope does
/// not carry it.
pub struct AuthContext<'a, S: Storage> {
    /// Backing store for secrets, nonces and hits.
    pub storage: &'a S,
    /// Authenticated-session user id.
    pub user_id: UserId,
}

impl<'a, S: Storage> AuthContext<'a, S> {
    /// Context for `user_id` backed by `storage`.
    pub fn new(storage: &'a S, user_id: UserId) -> Self {
        Self { storage, user_id }
    }
}

/// Raw inbound request: transport headers and body bytes.
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    /// Header name/value pairs as received.
    pub headers: &'a [(&'a str, &'a str)],
    /// Request body.
    pub body: &'a [u8],
}

impl<'a> InboundRequest<'a> {
    /// Request with no headers.
    pub fn new(body: &'a [u8]) -> Self {
        Self { headers: &[], body }
    }

    /// Request with headers.
    pub fn with_headers(headers: &'a [(&'a str, &'a str)], body: &'a [u8]) -> Self {
        Self { headers, body }
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

/// A request that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedRequest {
    /// Authenticated user.
    pub user_id: UserId,
    /// Window the request was sealed for.
    pub window: Window,
    /// Consumed nonce, if the envelope carried one.
    pub nonce: Option<String>,
    /// Decrypted application payload.
    pub payload: serde_json::Value,
}

/// Verifies inbound envelopes and seals outbound responses.
pub struct RequestAuthenticator<E: Environment> {
    env: E,
    vault: Arc<SeedVault>,
    policy: SecurityPolicy,
    replay: ReplayGuard,
    limiter: RateLimiter,
}

impl<E: Environment> RequestAuthenticator<E> {
    /// Create an authenticator.
    ///
    /// # Errors
    ///
    /// Rejects an inconsistent policy.
    pub fn new(
        env: E,
        vault: Arc<SeedVault>,
        policy: SecurityPolicy,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;

        let replay = ReplayGuard::from_policy(&policy);
        let limiter = RateLimiter::from_policy(&policy);
        Ok(Self { env, vault, policy, replay, limiter })
    }

    /// Active policy.
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Window for the server's current time.
    pub fn current_window(&self) -> Window {
        window_at(self.env.wall_clock_millis(), self.policy.window_size_ms)
    }

    /// Authenticate a raw request.
    ///
    /// On success the nonce is consumed and one hit is recorded against the
    /// user's rate budget. On any failure neither happens.
    pub fn authenticate<S: Storage>(
        &self,
        ctx: &AuthContext<'_, S>,
        request: &InboundRequest<'_>,
    ) -> Result<DecryptedRequest, AuthError> {
        let envelope = self
            .check_headers(request)
            .and_then(|()| RequestEnvelope::from_json(request.body))
            .inspect_err(|e| {
                warn!(user_id = %ctx.user_id, code = e.code(), error = %e, "request rejected");
            })?;

        self.authenticate_envelope(ctx, &envelope)
    }

    /// Authenticate an already parsed envelope.
    pub fn authenticate_envelope<S: Storage>(
        &self,
        ctx: &AuthContext<'_, S>,
        envelope: &RequestEnvelope,
    ) -> Result<DecryptedRequest, AuthError> {
        let now_ms = self.env.wall_clock_millis();
        let user_id = ctx.user_id;

        let result = self.run_pipeline(ctx, envelope, now_ms);
        match &result {
            Ok(request) => {
                debug!(%user_id, window = request.window, stage = %AuthStage::Delivered, "request accepted");
            },
            Err(e @ AuthError::KeyDerivationFailed { .. }) => {
                error!(%user_id, alert = true, error = %e, "request rejected");
            },
            Err(e) => {
                warn!(%user_id, code = e.code(), error = %e, "request rejected");
            },
        }

        result
    }

    fn run_pipeline<S: Storage>(
        &self,
        ctx: &AuthContext<'_, S>,
        envelope: &RequestEnvelope,
        now_ms: u64,
    ) -> Result<DecryptedRequest, AuthError> {
        let storage = ctx.storage;
        let user_id = ctx.user_id;

        envelope.validate(&self.policy)?;
        reached(user_id, AuthStage::Received);

        if let RateDecision::Limited(scope) = self.limiter.check(storage, user_id, now_ms)? {
            return Err(AuthError::RateLimited { scope });
        }
        reached(user_id, AuthStage::RateChecked);

        let current = window_at(now_ms, self.policy.window_size_ms);
        if !within_tolerance(current, envelope.window, self.policy.window_tolerance) {
            return Err(AuthError::WindowExpired { declared: envelope.window, current });
        }
        reached(user_id, AuthStage::WindowValidated);

        let key = self.session_key(ctx, envelope.window)?;
        reached(user_id, AuthStage::KeyDerived);

        if !verify_envelope(&key, &envelope.encrypted, &envelope.hmac) {
            return Err(AuthError::SignatureInvalid);
        }
        reached(user_id, AuthStage::HmacValidated);

        if let Some(nonce) = &envelope.nonce {
            if !self.replay.check_and_consume(storage, user_id, nonce, now_ms)? {
                return Err(AuthError::ReplayDetected);
            }
        }
        reached(user_id, AuthStage::NonceChecked);

        let payload = match open_payload(&envelope.encrypted, &key) {
            Ok(payload) => payload,
            Err(e) => {
                if let Some(nonce) = &envelope.nonce {
                    if let Err(release) = self.replay.release(storage, user_id, nonce) {
                        warn!(%user_id, error = %release, "failed to release nonce");
                    }
                }
                return Err(e);
            },
        };

        reached(user_id, AuthStage::Decrypted);

        if let Err(e) = self.limiter.record(storage, user_id, now_ms) {
            warn!(%user_id, error = %e, "failed to record rate-limit hit");
        }

        Ok(DecryptedRequest {
            user_id,
            window: envelope.window,
            nonce: envelope.nonce.clone(),
            payload,
        })
    }

    /// Encrypt and sign a response for the caller's user.
    ///
    /// Uses the server's current window (not the request's) and a fresh IV.
    pub fn build_response<S: Storage, T: Serialize + ?Sized>(
        &self,
        ctx: &AuthContext<'_, S>,
        payload: &T,
    ) -> Result<ResponseEnvelope, AuthError> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| AuthError::Internal { reason: e.to_string() })?;

        let window = self.current_window();
        let key = self.session_key(ctx, window).inspect_err(|e| {
            error!(user_id = %ctx.user_id, alert = true, error = %e, "response sealing failed");
        })?;

        let iv: [u8; IV_LEN] = self.env.random_array();
        let encrypted = encrypt_payload(&plaintext, &key, iv);
        let hmac = sign_envelope(&key, &encrypted);

        Ok(ResponseEnvelope { status: Status::Success, encrypted, window, hmac })
    }

    /// Rate-limit consumption for the caller's user.
    pub fn rate_limit_usage<S: Storage>(
        &self,
        ctx: &AuthContext<'_, S>,
    ) -> Result<RateLimitUsage, AuthError> {
        Ok(self.limiter.usage(ctx.storage, ctx.user_id, self.env.wall_clock_millis())?)
    }

    fn check_headers(&self, request: &InboundRequest<'_>) -> Result<(), AuthError> {
        for name in &self.policy.required_headers {
            if !request.has_header(name) {
                return Err(AuthError::malformed(format!("missing required header {name}")));
            }
        }
        Ok(())
    }

    fn session_key<S: Storage>(
        &self,
        ctx: &AuthContext<'_, S>,
        window: Window,
    ) -> Result<SessionKey, AuthError> {
        let user_id = ctx.user_id;
        let failed = |reason: String| AuthError::KeyDerivationFailed { user_id, reason };

        let record = ctx
            .storage
            .load_user_secret(user_id)?
            .ok_or_else(|| failed("no secret record".into()))?;

        let seed = self
            .vault
            .decrypt(&record.encrypted_master_seed, user_id.0)
            .map_err(|e| failed(e.to_string()))?;

        Ok(derive_session_key(
            &seed,
            record.session_salt.as_bytes(),
            &self.policy.protocol_label,
            window,
        ))
    }
}

fn reached(user_id: UserId, stage: AuthStage) {
    debug!(%user_id, %stage, "stage reached");
}

/// Decrypt and parse an authenticated payload.
pub(crate) fn open_payload(
    encrypted: &str,
    key: &SessionKey,
) -> Result<serde_json::Value, AuthError> {
    let plaintext = decrypt_payload(encrypted, key)
        .map_err(|e| AuthError::DecryptionFailed { reason: e.to_string() })?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| AuthError::DecryptionFailed { reason: format!("payload is not JSON: {e}") })
}
