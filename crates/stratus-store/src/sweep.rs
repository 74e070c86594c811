//! Periodic expiry sweeping.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::store::CacheStore;

/// Spawn a background task sweeping expired entries on a fixed interval.
///
/// The first sweep runs one full interval after spawn. Sweep failures are
/// absorbed by the store itself; the task only ever logs. Cancel the token
/// to stop the task.
pub fn spawn_periodic_sweep(
    store: CacheStore,
    every: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately on the first tick
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Periodic sweep stopped");
                    return;
                }
                _ = interval.tick() => {
                    let removed = store.sweep(max_age);
                    tracing::debug!("Periodic sweep removed {} entries", removed);
                }
            }
        }
    })
}
