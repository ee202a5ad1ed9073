//! Notifications and their delivery lifecycle.
//!
//! A notification is one outbound email event tied to an entry. Its history
//! is an append-only status log, newest first: registering a status prepends
//! an entry and never edits or removes prior ones, so `status_log[0]` is
//! always the current state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entry::Entry;
use crate::form::{FormDefinition, sanitize_email};
use crate::time::now_stamp;

/// Known lifecycle statuses.
///
/// `TransportFailed` / `TransportSucceeded` are transport-level confirmations
/// layered on top of the logical result — informational, never overriding
/// `SendSuccess` / `SendError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Scheduled,
    SendError,
    SendSuccess,
    TransportFailed,
    TransportSucceeded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Scheduled => "scheduled",
            Status::SendError => "send_error",
            Status::SendSuccess => "send_success",
            Status::TransportFailed => "transport_failed",
            Status::TransportSucceeded => "transport_succeeded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(Status::Scheduled),
            "send_error" => Some(Status::SendError),
            "send_success" => Some(Status::SendSuccess),
            "transport_failed" => Some(Status::TransportFailed),
            "transport_succeeded" => Some(Status::TransportSucceeded),
            _ => None,
        }
    }

    /// Statuses accepted by listing filters. Anything else makes the filter
    /// a no-op instead of an error.
    pub const FILTERABLE: [Status; 3] = [Status::Scheduled, Status::SendError, Status::SendSuccess];

    pub fn is_filterable(raw: &str) -> bool {
        Self::parse(raw).is_some_and(|s| Self::FILTERABLE.contains(&s))
    }

    /// Human label for display (CLI listings).
    pub fn label(raw: &str) -> &str {
        match raw {
            "scheduled" => "Envío programado",
            "send_error" => "Error al enviar",
            "send_success" => "Enviado correctamente",
            other => other,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a notification's status history.
///
/// The status is kept as free text: unrecognized labels loaded from storage
/// are preserved, listed, and counted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: String,
    pub datetime: String,
}

/// One outbound email event with its own delivery lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Store-assigned ID; 0 before first persistence.
    pub id: i64,
    /// Slug of the originating form; may be empty if the entry is gone.
    pub form: String,
    /// The entry this notification belongs to, if it still exists.
    pub entry_id: Option<i64>,
    /// Destination address, sanitized.
    pub email: String,
    /// Creation timestamp, storage format. Set once.
    pub created_on: String,
    /// Reverse-chronological status history. Prepend-only.
    pub status_log: Vec<StatusEntry>,
    /// Free-form metadata: subject override, last send error, transport payload.
    pub meta: Map<String, Value>,
}

impl Notification {
    /// New unsaved notification for an entry.
    pub fn new(form: &str, entry_id: i64, email: &str) -> Self {
        Self {
            id: 0,
            form: form.to_string(),
            entry_id: Some(entry_id),
            email: sanitize_email(email),
            created_on: now_stamp(),
            status_log: Vec::new(),
            meta: Map::new(),
        }
    }

    pub fn set_email(&mut self, email: &str) {
        self.email = sanitize_email(email);
    }

    /// Record an explicit subject override in meta.
    pub fn set_subject(&mut self, subject: &str) {
        self.meta
            .insert("subject".to_string(), Value::String(subject.to_string()));
    }

    pub fn meta_field(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.meta.insert(key.to_string(), value);
    }

    /// Current status: the first element of the log, or "" if nothing was
    /// ever registered.
    pub fn last_status(&self) -> &str {
        self.status_log
            .first()
            .map(|s| s.status.as_str())
            .unwrap_or("")
    }

    /// Prepend a status with the current timestamp. In-memory only — the
    /// change is not persisted until the notification is saved.
    pub fn register_status(&mut self, status: Status) {
        self.register_status_raw(status.as_str());
    }

    fn register_status_raw(&mut self, status: &str) {
        self.status_log.insert(
            0,
            StatusEntry {
                status: status.to_string(),
                datetime: now_stamp(),
            },
        );
    }

    /// Mail subject: the meta "subject" override verbatim if present,
    /// otherwise computed from the form title and the entry's sender name.
    pub fn subject(&self, form: Option<&FormDefinition>, entry: Option<&Entry>) -> String {
        if let Some(Value::String(custom)) = self.meta.get("subject")
            && !custom.is_empty()
        {
            return custom.clone();
        }
        let title = form.map(|f| f.title.as_str()).unwrap_or("");
        let sender = entry.map(|e| e.sender_name()).unwrap_or("");
        format!("[{title}] Envío de {sender}")
    }
}
