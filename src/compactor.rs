use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::{LocalStore, StoreError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Rewrite the log as a snapshot once `threshold` appends have piled up.
/// Returns true if it compacted.
pub async fn compact_if_due(store: &LocalStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await?;
    if appends < threshold.max(1) {
        debug!("compactor: {appends} appends since last compaction, below {threshold}");
        return Ok(false);
    }
    if !store.compact().await? {
        return Ok(false);
    }
    metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted log after {appends} appends");
    Ok(true)
}

/// Background task that keeps the write-ahead log from growing without bound.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64) {
    if !store.is_durable() {
        return;
    }
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}
