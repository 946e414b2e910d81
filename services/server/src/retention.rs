//! Retention worker: periodically deletes readings older than the cutoff in
//! bounded batches so a large backlog never turns into one giant delete.

use crate::config::RetentionConfig;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DELETE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run once immediately, then on the configured cadence until shutdown.
pub async fn run(store: Arc<dyn Store>, cfg: RetentionConfig, shutdown: CancellationToken) {
    if !cfg.enabled {
        return;
    }

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let cutoff = chrono::Utc::now().timestamp() - i64::from(cfg.days) * 24 * 3600;
                sweep(store.as_ref(), cutoff, cfg.batch_size).await;
            }
        }
    }
}

/// Delete in batches until the store reports nothing left below the cutoff.
async fn sweep(store: &dyn Store, cutoff: i64, batch_size: u32) {
    let mut total = 0u64;
    loop {
        match tokio::time::timeout(DELETE_TIMEOUT, store.delete_older_than(cutoff, batch_size))
            .await
        {
            Ok(Ok(0)) => break,
            Ok(Ok(deleted)) => {
                total += deleted;
                debug!(deleted, cutoff, "retention batch deleted");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "retention delete failed, will retry next interval");
                return;
            }
            Err(_) => {
                warn!("retention delete timed out, will retry next interval");
                return;
            }
        }
    }
    if total > 0 {
        info!(total, cutoff, "retention sweep complete");
    }
}
