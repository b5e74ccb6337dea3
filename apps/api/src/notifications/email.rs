//! SMTP delivery. Request paths hand messages to `send_in_background`, so a
//! slow or failing mail server never blocks or fails the caller.

use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address '{0}'")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub attachments: Vec<EmailAttachment>,
}

struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Cheap to clone; `None` inside means email is disabled.
#[derive(Clone)]
pub struct Mailer {
    sender: Option<Arc<SmtpSender>>,
}

impl Mailer {
    /// Builds an SMTP mailer, or a disabled one when SMTP is not configured.
    pub fn from_config(config: Option<&SmtpConfig>) -> anyhow::Result<Self> {
        let Some(config) = config else {
            info!("SMTP not configured; outgoing email is disabled");
            return Ok(Self::disabled());
        };

        let builder = if matches!(config.host.as_str(), "localhost" | "127.0.0.1") {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let mut builder = builder.port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| anyhow::anyhow!("SMTP_FROM '{}' is not a valid mailbox", config.from))?;

        info!("SMTP mailer configured for {}:{}", config.host, config.port);
        Ok(Self {
            sender: Some(Arc::new(SmtpSender {
                transport: builder.build(),
                from,
            })),
        })
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let Some(sender) = &self.sender else {
            info!(subject = %email.subject, "Email disabled; skipping send");
            return Ok(());
        };
        let message = build_message(&sender.from, &email)?;
        sender.transport.send(message).await?;
        info!(subject = %email.subject, recipients = email.to.len(), "Email sent");
        Ok(())
    }

    pub fn send_in_background(&self, email: OutgoingEmail) {
        let mailer = self.clone();
        tokio::spawn(async move {
            let subject = email.subject.clone();
            if let Err(e) = mailer.send(email).await {
                warn!(subject = %subject, "Failed to send email: {e}");
            }
        });
    }
}

pub fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, MailError> {
    if email.to.is_empty() {
        return Err(MailError::Build("no recipients".to_string()));
    }

    let mut builder = Message::builder().from(from.clone()).subject(&email.subject);
    for recipient in &email.to {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|_| MailError::Address(recipient.clone()))?;
        builder = builder.to(mailbox);
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::plain(email.text_body.clone()));
    for attachment in &email.attachments {
        let content_type = ContentType::parse(attachment.content_type)
            .map_err(|e| MailError::Build(e.to_string()))?;
        body = body.singlepart(
            Attachment::new(attachment.file_name.clone()).body(attachment.bytes.clone(), content_type),
        );
    }

    builder
        .multipart(body)
        .map_err(|e| MailError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> Mailbox {
        "Hirewire <no-reply@hirewire.test>".parse().unwrap()
    }

    fn email(to: Vec<&str>) -> OutgoingEmail {
        OutgoingEmail {
            to: to.into_iter().map(String::from).collect(),
            subject: "Your interview report".to_string(),
            text_body: "Attached.".to_string(),
            attachments: vec![EmailAttachment {
                file_name: "report.pdf".to_string(),
                content_type: "application/pdf",
                bytes: b"%PDF-1.5 test".to_vec(),
            }],
        }
    }

    #[test]
    fn test_message_includes_subject_and_attachment() {
        let message = build_message(&from(), &email(vec!["hr@acme.test"])).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("Subject: Your interview report"));
        assert!(raw.contains("report.pdf"));
        assert!(raw.contains("hr@acme.test"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        assert!(matches!(
            build_message(&from(), &email(vec!["not an address"])),
            Err(MailError::Address(_))
        ));
    }

    #[test]
    fn test_no_recipients_rejected() {
        assert!(matches!(
            build_message(&from(), &email(vec![])),
            Err(MailError::Build(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_mailer_skips_send() {
        let mailer = Mailer::disabled();
        assert!(!mailer.is_enabled());
        assert!(mailer.send(email(vec!["hr@acme.test"])).await.is_ok());
    }
}
