use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::observability;

const REAP_INTERVAL: Duration = Duration::from_secs(60);
const COMPACT_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that periodically purges appointments past retention.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        match engine.purge_stale().await {
            Ok(0) => {}
            Ok(purged) => {
                info!("reaped {purged} stale appointments");
                metrics::counter!(observability::APPOINTMENTS_PURGED_TOTAL)
                    .increment(purged as u64);
            }
            Err(e) => {
                tracing::error!("reaper purge failed: {e}");
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends have accumulated.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::error!("compaction failed: {e}"),
            }
        }
    }
}
