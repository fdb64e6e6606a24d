//! Report delivery over SMTP.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument, warn};

use chorekit_shared::{ChoreError, Result, SmtpConfig, is_valid_email};

use crate::report::Report;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A fully addressed message.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub attachment: Option<PathBuf>,
}

/// Delivers an [`OutgoingMail`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// `lettre` SMTP transport on tokio.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build from the `[smtp]` section and the resolved password, if any.
    pub fn new(config: &SmtpConfig, password: Option<String>) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(ChoreError::config("smtp.host is not set"));
        }

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ChoreError::Mail(format!("invalid SMTP relay {}: {e}", config.host)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));

        if let (Some(user), Some(password)) = (&config.username, password) {
            builder = builder.credentials(Credentials::new(user.clone(), password));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| ChoreError::Mail(format!("SMTP delivery failed: {e}")))?;
        Ok(())
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| ChoreError::Mail(format!("invalid address '{address}': {e}")))
}

/// Assemble the MIME message: HTML body plus the optional attachment.
fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&mail.from)?)
        .subject(mail.subject.clone());
    for to in &mail.to {
        builder = builder.to(mailbox(to)?);
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html.clone()));
    if let Some(path) = &mail.attachment {
        body = body.singlepart(attachment(path)?);
    }

    builder
        .multipart(body)
        .map_err(|e| ChoreError::Mail(format!("failed to build message: {e}")))
}

fn attachment(path: &Path) -> Result<SinglePart> {
    let content = std::fs::read(path).map_err(|e| ChoreError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.xlsx".into());
    let content_type = ContentType::parse(XLSX_MIME)
        .map_err(|e| ChoreError::Mail(format!("invalid content type: {e}")))?;
    Ok(Attachment::new(name).body(content, content_type))
}

// ---------------------------------------------------------------------------
// send_report
// ---------------------------------------------------------------------------

/// Mail `report` with `attachment` to the configured recipients.
///
/// Invalid recipient addresses are skipped with a warning. Returns
/// `Ok(false)` when no valid recipient is left; a delivery failure is an
/// error.
#[instrument(skip_all, fields(recipients = smtp.recipients.len()))]
pub async fn send_report(
    transport: &dyn MailTransport,
    smtp: &SmtpConfig,
    report: &Report,
    attachment: &Path,
) -> Result<bool> {
    let recipients: Vec<String> = smtp
        .recipients
        .iter()
        .map(|r| r.trim())
        .filter(|r| {
            let valid = is_valid_email(r);
            if !valid {
                warn!(recipient = %r, "skipping invalid recipient address");
            }
            valid
        })
        .map(String::from)
        .collect();

    if recipients.is_empty() {
        warn!("no valid recipient configured, report not mailed");
        return Ok(false);
    }
    if !is_valid_email(&smtp.from) {
        return Err(ChoreError::config(format!(
            "smtp.from '{}' is not a valid address",
            smtp.from
        )));
    }

    let mail = OutgoingMail {
        from: smtp.from.trim().to_string(),
        to: recipients,
        subject: report.subject(),
        html: report.html(),
        attachment: Some(attachment.to_path_buf()),
    };
    transport.send(&mail).await?;

    info!(to = ?mail.to, subject = %mail.subject, "report mailed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chorekit_shared::UrlCheckResult;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, mail: &OutgoingMail) -> Result<()> {
            if self.fail {
                return Err(ChoreError::Mail("relay refused".into()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn smtp(recipients: &[&str]) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            from: "checks@example.com".into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            ..SmtpConfig::default()
        }
    }

    fn report() -> Report {
        Report::new(vec![UrlCheckResult::invalid("nonsense", "not a URL")])
    }

    #[tokio::test]
    async fn sends_to_valid_recipients_only() {
        let transport = RecordingTransport::default();
        let sent = send_report(
            &transport,
            &smtp(&["ops@example.com", "not-an-address"]),
            &report(),
            Path::new("report.xlsx"),
        )
        .await
        .unwrap();

        assert!(sent);
        let mails = transport.sent.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, vec!["ops@example.com"]);
        assert!(mails[0].subject.starts_with("[Automatic Security Log]"));
        assert!(mails[0].html.contains("Invalid URLs"));
    }

    #[tokio::test]
    async fn no_valid_recipient_skips_mail() {
        let transport = RecordingTransport::default();
        let sent = send_report(&transport, &smtp(&[""]), &report(), Path::new("r.xlsx"))
            .await
            .unwrap();
        assert!(!sent);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_an_error() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let err = send_report(
            &transport,
            &smtp(&["ops@example.com"]),
            &report(),
            Path::new("r.xlsx"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChoreError::Mail(_)));
    }

    #[test]
    fn message_carries_html_and_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Security_Check.xlsx");
        std::fs::write(&path, b"PK fake workbook").unwrap();

        let message = build_message(&OutgoingMail {
            from: "checks@example.com".into(),
            to: vec!["ops@example.com".into(), "sec@example.com".into()],
            subject: "Report".into(),
            html: "<p>hi</p>".into(),
            attachment: Some(path),
        })
        .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Report"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("Security_Check.xlsx"));
        assert_eq!(message.envelope().to().len(), 2);
    }

    #[test]
    fn smtp_mailer_requires_host_when_recipients_are_set() {
        let config = SmtpConfig {
            recipients: vec!["ops@example.com".into()],
            ..SmtpConfig::default()
        };
        assert!(matches!(
            SmtpMailer::new(&config, None),
            Err(ChoreError::Config { .. })
        ));
    }
}
