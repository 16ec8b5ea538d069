//! Background sweep driver
//!
//! Runs [`EphemeralStore::sweep`] every `sweep_interval_ms` until the handle
//! is shut down or dropped. Sweeps are idempotent, so a missed or repeated
//! tick is harmless.

use crate::store::EphemeralStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Ephemeral sweeper exited abnormally");
        }
    }
}

/// Spawn the periodic sweep on the current tokio runtime.
pub fn spawn_sweeper(store: Arc<EphemeralStore>) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let period = store.config().sweep_interval();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = store.sweep().await {
                        warn!(error = %e, "Ephemeral sweep failed");
                    }
                }
            }
        }
        debug!("Ephemeral sweeper stopped");
    });
    SweeperHandle {
        shutdown_tx,
        handle,
    }
}
