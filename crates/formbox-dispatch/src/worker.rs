//! Delivery worker: drains the queue and runs the send pipeline.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use formbox_core::error::Result;
use formbox_core::form::FormRegistry;
use formbox_core::mailer::{Mailer, OutgoingMail};
use formbox_core::notification::{Notification, Status};
use formbox_core::render::{MessageRenderer, RenderContext};
use formbox_core::signing::entry_link;
use formbox_store::{EntryStore, NotificationStore};

use crate::queue::Dispatcher;

/// Runs the delivery pipeline for queued notifications. Also usable inline
/// through [`Worker::deliver`] when a caller wants a synchronous send.
pub struct Worker {
    entries: Arc<EntryStore>,
    notifications: Arc<NotificationStore>,
    registry: Arc<FormRegistry>,
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn MessageRenderer>,
    base_url: String,
}

impl Worker {
    pub fn new(
        entries: Arc<EntryStore>,
        notifications: Arc<NotificationStore>,
        registry: Arc<FormRegistry>,
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn MessageRenderer>,
        base_url: String,
    ) -> Self {
        Self {
            entries,
            notifications,
            registry,
            mailer,
            renderer,
            base_url,
        }
    }

    /// Worker loop: one delivery at a time, in queue order. A notification
    /// that cannot be loaded is logged and skipped; it stays untouched for
    /// the next sweep. Ends when the queue closes.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<i64>, queue: Dispatcher) {
        tracing::info!("📬 Delivery worker started");
        while let Some(id) = rx.recv().await {
            match self.notifications.find_by_id(id) {
                Ok(Some(mut notification)) => {
                    if let Err(e) = self.deliver(&mut notification).await {
                        tracing::warn!("Delivery of notification {id} aborted: {e}");
                    }
                }
                Ok(None) => tracing::warn!("Queued notification {id} no longer exists"),
                Err(e) => tracing::warn!("Could not load notification {id}: {e}"),
            }
            queue.finish(id);
        }
        tracing::info!("Delivery worker stopped");
    }

    /// One delivery attempt: render, hand to the transport, record the
    /// outcome in the status log, and persist. Returns whether the mail was
    /// delivered. The transport confirmation (when present) is registered
    /// before the logical result, so the head of the log always reflects
    /// `send_success` / `send_error`.
    pub async fn deliver(&self, notification: &mut Notification) -> Result<bool> {
        let entry = match notification.entry_id {
            Some(entry_id) => self.entries.find_by_id(entry_id)?,
            None => None,
        };
        let form = self.registry.get(&notification.form);

        let subject = notification.subject(form, entry.as_ref());
        let action_link = entry
            .as_ref()
            .map(|e| entry_link(&self.base_url, e.id, notification.id))
            .unwrap_or_default();
        let ctx = RenderContext::build(notification, form, entry.as_ref(), action_link);
        let html_body = self.renderer.render(&ctx);

        let mut headers = Vec::new();
        if let Some(entry) = &entry {
            let reply_to = entry.sender_email();
            if !reply_to.is_empty() {
                headers.push(("Reply-To".to_string(), reply_to.to_string()));
            }
        }

        let mail = OutgoingMail {
            to: notification.email.clone(),
            subject,
            html_body,
            headers,
        };
        let report = self.mailer.send(&mail).await;

        if let Some(transport) = &report.transport {
            notification.register_status(if transport.succeeded {
                Status::TransportSucceeded
            } else {
                Status::TransportFailed
            });
            notification.set_meta("transport", transport.detail.clone());
        }
        if report.delivered {
            notification.register_status(Status::SendSuccess);
            tracing::info!(
                "📤 Notification {} delivered to {}",
                notification.id,
                notification.email
            );
        } else {
            notification.register_status(Status::SendError);
            let detail = report
                .transport
                .as_ref()
                .map(|t| t.detail.clone())
                .unwrap_or_else(|| Value::String("send failed".into()));
            notification.set_meta("last_send_error", json!(detail.to_string()));
            tracing::warn!(
                "Notification {} to {} failed",
                notification.id,
                notification.email
            );
        }

        self.notifications.save(notification)?;
        Ok(report.delivered)
    }
}
