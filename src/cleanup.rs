//! Background sweep of expired entries.
//!
//! Local sessions and in-memory cache entries are only evicted lazily on
//! read. Entries nobody reads again would stay forever, so this job
//! periodically purges everything past its expiry.

use crate::storage::Sweep;
use std::sync::Arc;
use std::time::Duration;

/// Run the sweep loop.
///
/// Purges every store in `stores` once per `interval`. Never returns.
pub async fn run_sweep_loop(stores: Vec<Arc<dyn Sweep>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        sweep_once(&stores).await;
    }
}

/// Purge expired entries from every store, returning the total removed.
pub async fn sweep_once(stores: &[Arc<dyn Sweep>]) -> usize {
    let mut total = 0;

    for store in stores {
        let purged = store.purge_expired().await;
        if purged > 0 {
            tracing::info!(store = store.name(), purged, "Sweep removed expired entries");
        }
        total += purged;
    }

    total
}
