//! Periodic retry sweep.
//!
//! Anything still `scheduled` after its queue attempt (crash, worker restart,
//! queue closed) gets picked up here and queued again. The in-flight set in
//! the queue keeps a sweep from duplicating work already pending.

use std::sync::Arc;
use std::time::Duration;

use formbox_store::NotificationStore;

use crate::queue::Dispatcher;

/// Sweep loop. The first pass runs immediately, so notifications left
/// `scheduled` by a previous run are retried at startup.
pub async fn run_sweep(store: Arc<NotificationStore>, queue: Dispatcher, interval_secs: u64) {
    tracing::info!("🔁 Retry sweep every {interval_secs}s");
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        sweep_once(&store, &queue);
    }
}

/// One pass: queue every notification whose current status is `scheduled`.
/// Returns how many were actually queued.
pub fn sweep_once(store: &NotificationStore, queue: &Dispatcher) -> usize {
    let pending = match store.find_scheduled() {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!("Retry sweep failed to load pending notifications: {e}");
            return 0;
        }
    };
    let mut queued = 0;
    for notification in &pending {
        if queue.requeue(notification.id) {
            queued += 1;
        }
    }
    if queued > 0 {
        tracing::info!("Retry sweep queued {queued} of {} pending", pending.len());
    }
    queued
}
