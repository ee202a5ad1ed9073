//! The in-process delivery queue.
//!
//! Sending a notification means registering `scheduled`, persisting, and
//! pushing its id onto an unbounded channel. A shared in-flight set keeps the
//! same notification from being queued twice while a delivery attempt is
//! pending, so the retry sweep cannot pile up duplicates.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use formbox_core::error::Result;
use formbox_core::notification::{Notification, Status};
use formbox_store::NotificationStore;

/// Queue handle. Cheap to clone; all clones share the channel and the
/// in-flight set.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<NotificationStore>,
    tx: mpsc::UnboundedSender<i64>,
    inflight: Arc<Mutex<HashSet<i64>>>,
}

impl Dispatcher {
    /// Create the queue. The receiver half goes to the worker loop.
    pub fn new(store: Arc<NotificationStore>) -> (Self, mpsc::UnboundedReceiver<i64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            store,
            tx,
            inflight: Arc::new(Mutex::new(HashSet::new())),
        };
        (dispatcher, rx)
    }

    /// Schedule a notification for delivery and return immediately: the
    /// notification gets a `scheduled` status, is persisted, and its id is
    /// queued for the worker.
    pub fn send_async(&self, notification: &mut Notification) -> Result<()> {
        notification.register_status(Status::Scheduled);
        self.store.save(notification)?;
        self.enqueue(notification.id);
        Ok(())
    }

    /// Queue an already-scheduled notification without touching its status
    /// log. Used by the retry sweep. Returns false when the notification is
    /// already queued or being delivered.
    pub fn requeue(&self, notification_id: i64) -> bool {
        self.enqueue(notification_id)
    }

    /// Release a notification from the in-flight set once the worker is done
    /// with it.
    pub(crate) fn finish(&self, notification_id: i64) {
        self.inflight.lock().unwrap().remove(&notification_id);
    }

    fn enqueue(&self, notification_id: i64) -> bool {
        {
            let mut inflight = self.inflight.lock().unwrap();
            if !inflight.insert(notification_id) {
                tracing::debug!("Notification {notification_id} already queued, skipping");
                return false;
            }
        }
        if self.tx.send(notification_id).is_err() {
            // Worker is gone; drop the reservation so a later queue can retry.
            self.inflight.lock().unwrap().remove(&notification_id);
            tracing::warn!("Delivery queue closed, notification {notification_id} not queued");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formbox_store::db;

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<i64>, Arc<NotificationStore>) {
        let store = Arc::new(NotificationStore::new(db::open_in_memory().unwrap()));
        let (dispatcher, rx) = Dispatcher::new(store.clone());
        (dispatcher, rx, store)
    }

    #[tokio::test]
    async fn test_send_async_schedules_and_queues() {
        let (dispatcher, mut rx, store) = dispatcher();
        let n = Notification::new("contact", 1, "a@example.com");
        let mut n = store.create(n).unwrap();

        dispatcher.send_async(&mut n).unwrap();

        assert_eq!(n.last_status(), Status::Scheduled.as_str());
        let stored = store.find_by_id(n.id).unwrap().unwrap();
        assert_eq!(stored.last_status(), Status::Scheduled.as_str());
        assert_eq!(rx.recv().await, Some(n.id));
    }

    #[tokio::test]
    async fn test_duplicate_queue_is_suppressed() {
        let (dispatcher, mut rx, store) = dispatcher();
        let n = store
            .create(Notification::new("contact", 1, "a@example.com"))
            .unwrap();

        assert!(dispatcher.requeue(n.id));
        assert!(!dispatcher.requeue(n.id));
        assert_eq!(rx.recv().await, Some(n.id));
        assert!(rx.try_recv().is_err());

        // Once released, it can be queued again.
        dispatcher.finish(n.id);
        assert!(dispatcher.requeue(n.id));
    }

    #[tokio::test]
    async fn test_closed_queue_reports_failure() {
        let (dispatcher, rx, store) = dispatcher();
        let n = store
            .create(Notification::new("contact", 1, "a@example.com"))
            .unwrap();
        drop(rx);
        assert!(!dispatcher.requeue(n.id));
        // The reservation was dropped too.
        assert!(!dispatcher.inflight.lock().unwrap().contains(&n.id));
    }
}
