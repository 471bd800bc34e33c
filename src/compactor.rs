use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;
use crate::observability::WAL_COMPACTIONS_TOTAL;

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background task that rewrites the WAL as a snapshot once `threshold`
/// appends have accumulated since the last rewrite.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel.cancelled() => {
                tracing::debug!("compactor stopped");
                return;
            }
        }
        if let Err(e) = compact_if_due(&engine, threshold).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}

/// One compaction check. Returns the snapshot size when a rewrite happened.
pub async fn compact_if_due(
    engine: &Engine,
    threshold: u64,
) -> Result<Option<usize>, crate::engine::EngineError> {
    let appends = engine.appends_since_compact().await?;
    if appends < threshold {
        return Ok(None);
    }
    let events = engine.compact().await?;
    metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL: {appends} appends -> {events} events");
    Ok(Some(events))
}
