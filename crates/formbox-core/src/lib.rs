//! # Formbox Core
//!
//! Domain model for the form submission inbox: entries, notifications and
//! their delivery state machine, form definitions and validation, message
//! rendering, signed action links, configuration, and the error taxonomy.
//!
//! Persistence lives in `formbox-store`, queueing and delivery in
//! `formbox-dispatch`, SMTP transport in `formbox-mail`.

pub mod config;
pub mod entry;
pub mod error;
pub mod form;
pub mod mailer;
pub mod notification;
pub mod render;
pub mod signing;
pub mod time;

pub use config::FormboxConfig;
pub use entry::Entry;
pub use error::{FormboxError, Result};
pub use form::{FieldDef, FieldKind, FormDefinition, FormRegistry, process_submission};
pub use mailer::{MailReport, Mailer, OutgoingMail, TransportEvent};
pub use notification::{Notification, Status, StatusEntry};
pub use render::{HtmlRenderer, MessageRenderer, RenderContext};
pub use signing::LinkSigner;
