//! Expiry Sweep Task
//!
//! Background task that periodically reclaims expired cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Cache;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The task stops when `shutdown` flips to `true` or its sender is dropped.
/// Expired entries already read as absent before the sweep reaches them;
/// the sweep only frees their storage.
///
/// # Example
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let sweep_handle = spawn_sweep_task(cache.clone(), Duration::from_secs(20), shutdown_rx);
/// // Later, during shutdown:
/// shutdown_tx.send(true).ok();
/// sweep_handle.await.ok();
/// ```
pub fn spawn_sweep_task(
    cache: Arc<Cache>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiry sweep task with interval of {:?}", interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let removed = cache.sweep_expired().await;

            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }

        info!("Expiry sweep task stopped");
    })
}
