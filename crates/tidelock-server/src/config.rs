//! Server configuration.
//!
//! Read from the process environment (or the equivalent CLI flags). The vault
//! key is mandatory: there is no built-in key, and startup fails if it is
//! missing or malformed.

use std::{path::PathBuf, time::Duration};

use tidelock_core::{DEFAULT_PROTOCOL_LABEL, SecurityPolicy};
use tidelock_crypto::VaultKey;

use crate::error::ServerError;

/// Vault key, 64 hex characters.
pub const ENV_VAULT_KEY: &str = "TIDELOCK_VAULT_KEY";
/// Path of the redb database file.
pub const ENV_DB_PATH: &str = "TIDELOCK_DB_PATH";
/// Seconds between sweeper runs.
pub const ENV_SWEEP_INTERVAL_SECS: &str = "TIDELOCK_SWEEP_INTERVAL_SECS";
/// Requests per user per trailing minute.
pub const ENV_MINUTE_LIMIT: &str = "TIDELOCK_MINUTE_LIMIT";
/// Requests per user per trailing hour.
pub const ENV_HOUR_LIMIT: &str = "TIDELOCK_HOUR_LIMIT";
/// HKDF label shared with clients.
pub const ENV_PROTOCOL_LABEL: &str = "TIDELOCK_PROTOCOL_LABEL";

/// Raw settings before validation.
///
/// Doubles as the CLI flag set: every field has an environment fallback.
#[derive(Debug, Clone, clap::Args)]
pub struct ServerSettings {
    /// Vault key protecting master seeds (64 hex characters)
    #[arg(long, env = "TIDELOCK_VAULT_KEY", hide_env_values = true)]
    pub vault_key: Option<String>,

    /// Path to the redb database
    #[arg(long, env = "TIDELOCK_DB_PATH", default_value = "tidelock.redb")]
    pub db_path: PathBuf,

    /// Seconds between sweeper runs
    #[arg(long, env = "TIDELOCK_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Requests per user per trailing minute
    #[arg(long, env = "TIDELOCK_MINUTE_LIMIT", default_value_t = 200)]
    pub minute_limit: u32,

    /// Requests per user per trailing hour
    #[arg(long, env = "TIDELOCK_HOUR_LIMIT", default_value_t = 10_000)]
    pub hour_limit: u32,

    /// HKDF label shared with clients
    #[arg(long, env = "TIDELOCK_PROTOCOL_LABEL", default_value = DEFAULT_PROTOCOL_LABEL)]
    pub protocol_label: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let policy = SecurityPolicy::default();
        Self {
            vault_key: None,
            db_path: PathBuf::from("tidelock.redb"),
            sweep_interval_secs: 60,
            minute_limit: policy.minute_limit,
            hour_limit: policy.hour_limit,
            protocol_label: policy.protocol_label,
        }
    }
}

impl ServerSettings {
    /// Settings from the process environment, defaults for unset variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let defaults = Self::default();

        Ok(Self {
            vault_key: lookup(ENV_VAULT_KEY),
            db_path: lookup(ENV_DB_PATH).map_or(defaults.db_path, PathBuf::from),
            sweep_interval_secs: lookup_number(&lookup, ENV_SWEEP_INTERVAL_SECS)?
                .unwrap_or(defaults.sweep_interval_secs),
            minute_limit: lookup_number(&lookup, ENV_MINUTE_LIMIT)?.unwrap_or(defaults.minute_limit),
            hour_limit: lookup_number(&lookup, ENV_HOUR_LIMIT)?.unwrap_or(defaults.hour_limit),
            protocol_label: lookup(ENV_PROTOCOL_LABEL).unwrap_or(defaults.protocol_label),
        })
    }

    /// Validate and build the runtime configuration.
    pub fn into_config(self) -> Result<ServerConfig, ServerError> {
        let Some(hex_key) = self.vault_key else {
            return Err(ServerError::Config(format!("{ENV_VAULT_KEY} is not set")));
        };
        let vault_key = VaultKey::from_hex(&hex_key)
            .map_err(|e| ServerError::Config(format!("{ENV_VAULT_KEY}: {e}")))?;

        if self.sweep_interval_secs == 0 {
            return Err(ServerError::Config(format!("{ENV_SWEEP_INTERVAL_SECS} must be positive")));
        }

        let policy = SecurityPolicy {
            minute_limit: self.minute_limit,
            hour_limit: self.hour_limit,
            protocol_label: self.protocol_label,
            ..SecurityPolicy::default()
        };
        policy.validate()?;

        Ok(ServerConfig {
            vault_key,
            db_path: self.db_path,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            policy,
        })
    }
}

/// Validated runtime configuration.
#[derive(Debug)]
pub struct ServerConfig {
    /// Key protecting master seeds at rest.
    pub vault_key: VaultKey,
    /// Path to the redb database.
    pub db_path: PathBuf,
    /// Time between sweeper runs.
    pub sweep_interval: Duration,
    /// Authentication policy.
    pub policy: SecurityPolicy,
}

impl ServerConfig {
    /// Configuration from the process environment.
    pub fn from_env() -> Result<Self, ServerError> {
        ServerSettings::from_env()?.into_config()
    }
}

fn lookup_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ServerError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ServerError::Config(format!("{name}: expected a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";

    fn settings(vars: &[(&str, &str)]) -> Result<ServerSettings, ServerError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        ServerSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn missing_vault_key_is_fatal() {
        let err = settings(&[]).unwrap().into_config().unwrap_err();
        assert!(err.to_string().contains(ENV_VAULT_KEY));
    }

    #[test]
    fn malformed_vault_key_is_fatal() {
        let short = settings(&[(ENV_VAULT_KEY, "abcd")]).unwrap().into_config();
        assert!(matches!(short, Err(ServerError::Config(_))));

        let not_hex = "zz".repeat(32);
        let not_hex = settings(&[(ENV_VAULT_KEY, not_hex.as_str())]).unwrap().into_config();
        assert!(matches!(not_hex, Err(ServerError::Config(_))));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = settings(&[(ENV_VAULT_KEY, KEY)]).unwrap().into_config().unwrap();

        assert_eq!(config.db_path, PathBuf::from("tidelock.redb"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.policy, SecurityPolicy::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = settings(&[
            (ENV_VAULT_KEY, KEY),
            (ENV_DB_PATH, "/var/lib/tidelock/db.redb"),
            (ENV_SWEEP_INTERVAL_SECS, "15"),
            (ENV_MINUTE_LIMIT, "50"),
            (ENV_HOUR_LIMIT, " 900 "),
            (ENV_PROTOCOL_LABEL, "tidelock_v2"),
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/tidelock/db.redb"));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
        assert_eq!(config.policy.minute_limit, 50);
        assert_eq!(config.policy.hour_limit, 900);
        assert_eq!(config.policy.protocol_label, "tidelock_v2");
    }

    #[test]
    fn rejects_bad_numbers_and_policies() {
        assert!(settings(&[(ENV_MINUTE_LIMIT, "lots")]).is_err());

        let inverted = settings(&[
            (ENV_VAULT_KEY, KEY),
            (ENV_MINUTE_LIMIT, "500"),
            (ENV_HOUR_LIMIT, "100"),
        ])
        .unwrap()
        .into_config();
        assert!(matches!(inverted, Err(ServerError::Config(_))));

        let no_sweep =
            settings(&[(ENV_VAULT_KEY, KEY), (ENV_SWEEP_INTERVAL_SECS, "0")])
                .unwrap()
                .into_config();
        assert!(matches!(no_sweep, Err(ServerError::Config(_))));
    }
}
