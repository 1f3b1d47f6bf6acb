use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::{Engine, WalStore};
use crate::observability::WAL_COMPACTIONS_TOTAL;

pub const COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// Background task: compacts the WAL once it has grown past `threshold`
/// appends, and drops scope locks left behind by finished requests.
pub async fn run_compactor(store: Arc<WalStore>, engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
        let pruned = engine.prune_scope_locks();
        if pruned > 0 {
            debug!("pruned {pruned} idle scope locks");
        }
    }
}

/// Returns true if a compaction ran and succeeded.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}
