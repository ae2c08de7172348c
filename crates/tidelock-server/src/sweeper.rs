//! Background sweeper task.
//!
//! Runs [`Sweeper::sweep_once`] on a fixed interval until shutdown is
//! signalled. A failing sweep is logged and retried on the next tick; it never
//! blocks or fails foreground authentication.

use std::time::Duration;

use tidelock_core::{Environment, Storage, Sweeper};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Spawn the sweeper on the current tokio runtime.
///
/// The first sweep runs immediately. The task exits when `shutdown` flips to
/// `true` or its sender is dropped.
pub fn spawn_sweeper<E: Environment, S: Storage>(
    env: E,
    storage: S,
    sweeper: Sweeper,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match sweeper.sweep_once(&storage, env.wall_clock_millis()) {
                        Ok(report) if report.nonces_removed + report.hits_removed > 0 => {
                            info!(
                                nonces_removed = report.nonces_removed,
                                hits_removed = report.hits_removed,
                                "swept expired records"
                            );
                        },
                        Ok(_) => debug!("nothing to sweep"),
                        Err(e) => warn!(error = %e, "sweep failed, retrying next tick"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("sweeper stopped");
    })
}
