//! Periodic cleanup of producers that stopped pinging.

use std::time::Duration;

use tracing::info;

use super::StreamHub;

/// Every `interval`, close producers whose last ping is older than `interval`.
///
/// Runs until the task is dropped or aborted.
pub async fn run(hub: StreamHub, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let count = hub.reap(interval);
        info!(
            name: "relay.reaper.swept",
            closed = count,
            streams = hub.stream_count(),
            "Cleaned up {count} connections"
        );
    }
}

/// Spawn [`run`] on the current runtime.
pub fn spawn(hub: StreamHub, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(hub, interval))
}
