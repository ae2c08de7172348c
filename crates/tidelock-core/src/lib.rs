//! Tidelock request authentication.
//!
//! Verifies encrypted, signed request envelopes against time-windowed
//! session keys, enforces single-use nonces and per-user rate limits, and
//! seals responses under the server's current window.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ RequestAuthenticator<E: Environment>             │
//! │  - stage pipeline, response sealing              │
//! ├─────────────┬──────────────┬─────────────────────┤
//! │ RateLimiter │ ReplayGuard  │ SeedVault + HKDF    │
//! ├─────────────┴──────────────┴─────────────────────┤
//! │ Storage (secrets, nonces, hits)                  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The authenticator is generic over [`Environment`] (clock and entropy) and
//! takes its [`Storage`] per call through an [`AuthContext`], so the same
//! pipeline runs against memory, fault-injecting and on-disk stores.
//!
//! # Guarantees
//!
//! - A request is accepted only if its window is within tolerance, its MAC
//!   verifies under the key derived for that window, and its nonce was never
//!   accepted before for the same user
//! - A rejected request consumes neither a nonce nor rate-limit budget
//! - Storage failures reject the request

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authenticator;
pub mod client;
pub mod env;
pub mod envelope;
pub mod error;
pub mod issuance;
pub mod policy;
pub mod rate_limit;
pub mod replay;
pub mod storage;
pub mod sweeper;
pub mod types;

pub use authenticator::{
    AuthContext, AuthStage, DecryptedRequest, InboundRequest, RequestAuthenticator,
};
pub use client::ClientSession;
pub use env::{Environment, ManualEnv};
pub use envelope::{ErrorBody, RequestEnvelope, ResponseEnvelope, Status};
pub use error::{AuthError, AuthErrorKind};
pub use issuance::{CredentialIssuer, IssuedCredentials};
pub use policy::{DEFAULT_PROTOCOL_LABEL, PolicyError, SecurityPolicy};
pub use rate_limit::{RateDecision, RateLimitUsage, RateLimiter, RateScope, WindowUsage};
pub use replay::ReplayGuard;
pub use storage::{ChaoticStorage, MemoryStorage, Storage, StorageError};
pub use sweeper::{SweepReport, Sweeper};
pub use types::{NonceRecord, UserId, UserSecretRecord};
