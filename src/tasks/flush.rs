//! Snapshot Flush Task
//!
//! Background task that periodically writes the cache to disk when dirty.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{FlushOutcome, PersistenceManager};

/// Spawns a background task flushing the cache snapshot on a fixed interval.
///
/// A failed flush leaves the store dirty and is retried on the next tick.
pub fn spawn_flush_task(
    persistence: Arc<PersistenceManager>,
    flush_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(flush_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting snapshot flush task with interval of {} seconds",
            flush_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match persistence.flush().await {
                Ok(FlushOutcome::Written { entries }) => {
                    debug!("Snapshot flush: wrote {} entries", entries)
                }
                Ok(FlushOutcome::Skipped) => debug!("Snapshot flush: cache clean"),
                Err(err) => warn!("Snapshot flush failed, retrying next tick: {}", err),
            }
        }
    })
}
