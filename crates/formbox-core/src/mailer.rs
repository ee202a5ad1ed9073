//! Mail transport contract.

use async_trait::async_trait;
use serde_json::Value;

/// A mail ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub headers: Vec<(String, String)>,
}

/// Transport-level confirmation, attached to the report when the transport
/// exposes one. Purely informational.
#[derive(Debug, Clone)]
pub struct TransportEvent {
    pub succeeded: bool,
    /// Provider payload or error detail, recorded into notification meta.
    pub detail: Value,
}

/// Outcome of a send attempt. `delivered` is the logical result; the optional
/// transport event never overrides it.
#[derive(Debug, Clone)]
pub struct MailReport {
    pub delivered: bool,
    pub transport: Option<TransportEvent>,
}

impl MailReport {
    pub fn delivered(transport: Option<TransportEvent>) -> Self {
        Self {
            delivered: true,
            transport,
        }
    }

    pub fn failed(transport: Option<TransportEvent>) -> Self {
        Self {
            delivered: false,
            transport,
        }
    }
}

/// Something that can deliver a notification mail.
///
/// Send failures are reported, not returned as errors: a failed delivery is a
/// status transition for the notification, not an abort.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> MailReport;
}
