//! Periodic sync tick

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::VaultError;
use crate::vault::Vault;

/// Spawn a task that calls `update_transaction_history` every `interval`
/// until a shutdown signal arrives. Ticks are skipped in test mode.
pub fn spawn_sync_task(
    vault: Arc<Vault>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), "Sync task started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Sync task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match vault.app_data() {
                        Ok(app) if app.test_mode_enabled => continue,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Could not read vault state");
                            continue;
                        }
                    }
                    match vault.update_transaction_history().await {
                        Ok(response) => debug!(message = %response.message, "Periodic sync finished"),
                        Err(VaultError::SyncBusy) => debug!("Sync already running, tick skipped"),
                        Err(e) => warn!(error = %e, "Periodic sync failed"),
                    }
                }
            }
        }

        info!("Sync task stopped");
    })
}
