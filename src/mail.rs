use crate::BoxError;
use crate::config::SmtpConfig;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Outgoing mail: report deliveries and error replies.
pub trait Mailer: Send + Sync {
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), BoxError>;
}

/// Build a plain-text message, multipart when there are PDF attachments.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    attachments: Vec<(String, Vec<u8>)>,
) -> Result<Message, BoxError> {
    let builder = Message::builder()
        .from(from.parse::<Mailbox>()?)
        .to(to.parse::<Mailbox>()?)
        .subject(subject);

    if attachments.is_empty() {
        return Ok(builder
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?);
    }

    let pdf = ContentType::parse("application/pdf")?;
    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));
    for (name, bytes) in attachments {
        parts = parts.singlepart(Attachment::new(name).body(bytes, pdf.clone()));
    }
    Ok(builder.multipart(parts)?)
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, BoxError> {
        let transport = SmtpTransport::starttls_relay(&cfg.server)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone().unwrap_or_else(|| cfg.username.clone()),
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<(), BoxError> {
        let mut files = Vec::with_capacity(attachments.len());
        for path in attachments {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "report.pdf".to_string());
            files.push((name, fs::read(path)?));
        }

        let email = build_message(&self.from, to, subject, body, files)?;
        self.transport.send(&email)?;
        info!(to = %to, subject = %subject, attachments = attachments.len(), "Mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_reply() {
        let msg = build_message(
            "bot@example.com",
            "john.doe@example.com",
            "Ticket 111111 Not Found",
            "Ticket #111111 not found in Smartsheet.",
            Vec::new(),
        )
        .unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Subject: Ticket 111111 Not Found"));
        assert!(raw.contains("To: john.doe@example.com"));
        assert!(!raw.contains("multipart/mixed"));
    }

    #[test]
    fn test_report_with_attachment() {
        let msg = build_message(
            "bot@example.com",
            "ann@example.com",
            "Purple Doc Report for Ticket #123456",
            "Here is your form.",
            vec![("123456 - DEPOT - 01-09-25 - PurpleDoc.pdf".to_string(), b"%PDF-1.5".to_vec())],
        )
        .unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("application/pdf"));
    }

    #[test]
    fn test_bad_address_is_error() {
        assert!(build_message("bot@example.com", "not an address", "s", "b", Vec::new()).is_err());
    }
}
