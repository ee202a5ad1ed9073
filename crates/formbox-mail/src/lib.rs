//! SMTP delivery via async lettre, plus a scriptable mock for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;

use formbox_core::config::SmtpConfig;
use formbox_core::error::{FormboxError, Result};
use formbox_core::mailer::{MailReport, Mailer, OutgoingMail, TransportEvent};

/// Sends notification mails through an SMTP relay (STARTTLS).
pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| FormboxError::Mail(format!("SMTP relay: {e}")))?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self { config, transport })
    }

    /// Build the lettre message. Failures here are reported as transport
    /// events so they end up in the notification's status log.
    fn build_message(&self, mail: &OutgoingMail) -> Result<Message> {
        let from_name = self.config.from_name.as_deref().unwrap_or("Formbox");
        let from: Mailbox = format!("{from_name} <{}>", self.config.from_email)
            .parse()
            .map_err(|e| FormboxError::Mail(format!("From address: {e}")))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| FormboxError::Mail(format!("To address '{}': {e}", mail.to)))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .header(ContentType::TEXT_HTML);

        for (name, value) in &mail.headers {
            if name.eq_ignore_ascii_case("reply-to") {
                let reply_to: Mailbox = value
                    .parse()
                    .map_err(|e| FormboxError::Mail(format!("Reply-To address: {e}")))?;
                builder = builder.reply_to(reply_to);
            } else {
                tracing::debug!("Ignoring unsupported mail header: {name}");
            }
        }

        builder
            .body(mail.html_body.clone())
            .map_err(|e| FormboxError::Mail(format!("Build mail: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> MailReport {
        let message = match self.build_message(mail) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Mail build failed for {}: {e}", mail.to);
                return MailReport::failed(Some(TransportEvent {
                    succeeded: false,
                    detail: json!({ "stage": "build", "error": e.to_string() }),
                }));
            }
        };

        match self.transport.send(message).await {
            Ok(response) => {
                tracing::info!("Mail sent to {}", mail.to);
                MailReport::delivered(Some(TransportEvent {
                    succeeded: true,
                    detail: json!({
                        "code": response.code().to_string(),
                        "message": response.message().collect::<Vec<&str>>().join(" "),
                    }),
                }))
            }
            Err(e) => {
                tracing::warn!("SMTP send to {} failed: {e}", mail.to);
                MailReport::failed(Some(TransportEvent {
                    succeeded: false,
                    detail: json!({ "stage": "smtp", "error": e.to_string() }),
                }))
            }
        }
    }
}

/// In-memory mailer for tests: records every mail, fails on demand.
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer that reports every send as failed.
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.fail.store(true, Ordering::SeqCst);
        mailer
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Copies of every mail handed to this mailer, oldest first.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: &OutgoingMail) -> MailReport {
        self.sent.lock().unwrap().push(mail.clone());
        if self.fail.load(Ordering::SeqCst) {
            MailReport::failed(Some(TransportEvent {
                succeeded: false,
                detail: json!({ "error": "mock failure" }),
            }))
        } else {
            MailReport::delivered(Some(TransportEvent {
                succeeded: true,
                detail: json!({ "accepted": true }),
            }))
        }
    }
}
