//! Tidelock operator binary.
//!
//! # Usage
//!
//! ```bash
//! # Generate a vault key (store it in your secret manager)
//! tidelock-server keygen
//!
//! export TIDELOCK_VAULT_KEY=<64 hex chars>
//!
//! # Issue (or rotate) credentials for a user
//! tidelock-server issue --user 42
//!
//! # End-to-end self-test against the store
//! tidelock-server probe --user 42
//!
//! # Run the sweeper until Ctrl-C
//! tidelock-server sweep
//! ```

use std::io::Write;

use clap::{Parser, Subcommand};
use tidelock_core::{AuthContext, Environment, UserId};
use tidelock_crypto::VaultKey;
use tidelock_server::{ServerContext, ServerError, ServerSettings, SystemEnv, spawn_sweeper};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tidelock authentication server tooling
#[derive(Parser, Debug)]
#[command(name = "tidelock-server")]
#[command(about = "Time-windowed request authentication for Tidelock")]
#[command(version)]
struct Args {
    #[command(flatten)]
    settings: ServerSettings,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh random vault key as hex
    Keygen,

    /// Rotate a user's master seed and session salt, printing them once
    Issue {
        /// User id
        #[arg(long)]
        user: u64,
    },

    /// Print a user's rate-limit usage as JSON
    Usage {
        /// User id
        #[arg(long)]
        user: u64,
    },

    /// Prune expired nonces and rate-limit hits
    Sweep {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Seal a ping as the user's client and run it through the pipeline
    Probe {
        /// User id
        #[arg(long)]
        user: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    if let Command::Keygen = args.command {
        let key: [u8; VaultKey::LEN] = SystemEnv::new().random_array();
        return emit(&hex::encode(key));
    }

    let config = args.settings.into_config()?;
    let sweep_interval = config.sweep_interval;
    tracing::info!(db_path = %config.db_path.display(), "opening store");
    let server = ServerContext::open(config)?;

    match args.command {
        Command::Keygen => Ok(()),
        Command::Issue { user } => {
            let issued = server.issuer().rotate(server.storage(), UserId(user))?;
            let output = serde_json::json!({
                "user_id": user,
                "master_seed": issued.master_seed.expose_hex(),
                "session_salt": issued.session_salt,
                "issued_at_ms": issued.issued_at_ms,
            });
            emit(&output.to_string())
        },
        Command::Usage { user } => {
            let ctx = AuthContext::new(server.storage(), UserId(user));
            let usage = server.authenticator().rate_limit_usage(&ctx)?;
            emit(&serde_json::to_string(&usage)?)
        },
        Command::Sweep { once: true } => {
            let now_ms = SystemEnv::new().wall_clock_millis();
            let report = server.sweeper().sweep_once(server.storage(), now_ms)?;
            emit(
                &serde_json::json!({
                    "nonces_removed": report.nonces_removed,
                    "hits_removed": report.hits_removed,
                })
                .to_string(),
            )
        },
        Command::Sweep { once: false } => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = spawn_sweeper(
                SystemEnv::new(),
                server.storage().clone(),
                server.sweeper(),
                sweep_interval,
                shutdown_rx,
            );

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            handle.await?;
            Ok(())
        },
        Command::Probe { user } => {
            let response = server.probe(UserId(user))?;
            tracing::info!(user, "probe succeeded");
            emit(&response.to_string())
        },
    }
}

fn emit(line: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").map_err(ServerError::from)?;
    Ok(())
}
