//! Tidelock server runtime.
//!
//! Production glue around [`tidelock_core`]: durable redb storage, the
//! system clock and OS entropy, configuration, the background sweeper and a
//! transport-agnostic request handler.
//!
//! # Components
//!
//! - [`ServerContext`]: authenticator, issuer and sweeper bound to one store
//! - [`RedbStorage`]: durable [`Storage`] backend
//! - [`SystemEnv`]: production environment (wall clock, crypto RNG)
//! - [`spawn_sweeper`]: periodic pruning of expired nonces and hits
//!
//! HTTP framing is left to the embedding service: [`ServerContext::handle`]
//! turns request bytes into a status code and a JSON body.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod storage;
mod sweeper;
mod system_env;

use std::sync::Arc;

pub use config::{
    ENV_DB_PATH, ENV_HOUR_LIMIT, ENV_MINUTE_LIMIT, ENV_PROTOCOL_LABEL, ENV_SWEEP_INTERVAL_SECS,
    ENV_VAULT_KEY, ServerConfig, ServerSettings,
};
pub use error::ServerError;
pub use storage::{
    ChaoticStorage, MemoryStorage, PRUNE_BATCH, RedbStorage, Storage, StorageError,
};
pub use sweeper::spawn_sweeper;
pub use system_env::SystemEnv;
use tidelock_core::{
    AuthContext, AuthError, ClientSession, CredentialIssuer, DecryptedRequest, Environment,
    InboundRequest, RequestAuthenticator, ResponseEnvelope, SecurityPolicy, Sweeper, UserId,
};
use tidelock_crypto::{IV_LEN, SeedVault};
use tracing::error;

/// Status code and JSON body for one handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP-equivalent status.
    pub status: u16,
    /// JSON body: a response envelope on success, an error body otherwise.
    pub body: String,
}

/// Authenticator, issuer and sweeper sharing one store and one vault.
pub struct ServerContext<E: Environment, S: Storage> {
    env: E,
    storage: S,
    vault: Arc<SeedVault>,
    policy: SecurityPolicy,
    authenticator: RequestAuthenticator<E>,
    issuer: CredentialIssuer<E>,
    sweeper: Sweeper,
}

impl ServerContext<SystemEnv, RedbStorage> {
    /// Open the configured database with the system environment.
    pub fn open(config: ServerConfig) -> Result<Self, ServerError> {
        let storage = RedbStorage::open(&config.db_path)?;
        Self::new(SystemEnv::new(), storage, config)
    }
}

impl<E: Environment, S: Storage> ServerContext<E, S> {
    /// Context over an explicit environment and store.
    pub fn new(env: E, storage: S, config: ServerConfig) -> Result<Self, ServerError> {
        let vault = Arc::new(SeedVault::new(config.vault_key));
        let authenticator =
            RequestAuthenticator::new(env.clone(), vault.clone(), config.policy.clone())?;
        let issuer = CredentialIssuer::new(env.clone(), vault.clone());
        let sweeper = Sweeper::from_policy(&config.policy)?;

        Ok(Self { env, storage, vault, policy: config.policy, authenticator, issuer, sweeper })
    }

    /// Backing store.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Request authenticator.
    pub fn authenticator(&self) -> &RequestAuthenticator<E> {
        &self.authenticator
    }

    /// Credential issuer.
    pub fn issuer(&self) -> &CredentialIssuer<E> {
        &self.issuer
    }

    /// Sweeper configured from the policy.
    pub fn sweeper(&self) -> Sweeper {
        self.sweeper
    }

    /// Authenticate `request` for `user_id`, run `handler` on the payload and
    /// seal its result.
    ///
    /// Rejections produce the error body with the matching status; the
    /// handler only ever sees authenticated requests.
    pub fn handle<F>(&self, user_id: UserId, request: &InboundRequest<'_>, handler: F) -> Reply
    where
        F: FnOnce(DecryptedRequest) -> serde_json::Value,
    {
        let ctx = AuthContext::new(&self.storage, user_id);

        let sealed = self
            .authenticator
            .authenticate(&ctx, request)
            .map(handler)
            .and_then(|output| self.authenticator.build_response(&ctx, &output));

        match sealed {
            Ok(response) => Reply { status: 200, body: response.to_json() },
            Err(e) => Reply { status: e.http_status(), body: e.to_error_body().to_json() },
        }
    }

    /// Client session for a user, built from the stored credentials.
    ///
    /// Only for operator self-tests: it decrypts the user's master seed.
    pub fn client_session(&self, user_id: UserId) -> Result<ClientSession, ServerError> {
        let record =
            self.storage.load_user_secret(user_id)?.ok_or(ServerError::UnknownUser(user_id))?;

        let seed = self.vault.decrypt(&record.encrypted_master_seed, user_id.0).map_err(|e| {
            error!(%user_id, alert = true, error = %e, "stored seed does not decrypt");
            ServerError::Auth(AuthError::KeyDerivationFailed { user_id, reason: e.to_string() })
        })?;

        Ok(ClientSession::new(seed, record.session_salt, &self.policy))
    }

    /// End-to-end self-test for one user.
    ///
    /// Seals a ping as the client would, pushes it through [`Self::handle`]
    /// and opens the sealed reply. Consumes one nonce and one unit of the
    /// user's rate budget.
    pub fn probe(&self, user_id: UserId) -> Result<serde_json::Value, ServerError> {
        let client = self.client_session(user_id)?;

        let window = client.window_at(self.env.wall_clock_millis());
        let nonce = format!("probe-{:016x}", self.env.random_u64());
        let iv: [u8; IV_LEN] = self.env.random_array();
        let envelope = client
            .seal_request(&serde_json::json!({"action": "ping"}), window, nonce, iv)
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        let body = envelope.to_json();
        let reply = self.handle(user_id, &InboundRequest::new(body.as_bytes()), |request| {
            serde_json::json!({"pong": true, "window": request.window})
        });

        if reply.status != 200 {
            return Err(ServerError::ProbeRejected { status: reply.status, body: reply.body });
        }

        let response = ResponseEnvelope::from_json(reply.body.as_bytes())?;
        Ok(client.open_response(&response)?)
    }
}
