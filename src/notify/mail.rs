//! SMTP email delivery via lettre.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{MailTransport, NotifyError};
use crate::quota::Channel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Recipient. Defaults to the sending account.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            to: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A message to deliver. Empty attachment paths are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMail {
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl OutgoingMail {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }
}

async fn attachment_part(path: &Path) -> Result<SinglePart, NotifyError> {
    let content = tokio::fs::read(path).await.map_err(|e| NotifyError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = ContentType::parse(mime.essence_str())
        .map_err(|e| NotifyError::Build(format!("Bad content type {}: {}", mime, e)))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(Attachment::new(filename).body(content, content_type))
}

/// Build a plain-text message with the given attachments.
pub async fn build_message(from: &str, to: &str, mail: &OutgoingMail) -> Result<Message, NotifyError> {
    let from: Mailbox = from
        .parse()
        .map_err(|e| NotifyError::Build(format!("Invalid from: {}", e)))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| NotifyError::Build(format!("Invalid to: {}", e)))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    for path in &mail.attachments {
        if path.as_os_str().is_empty() {
            continue;
        }
        debug!("Attaching {}", path.display());
        parts = parts.singlepart(attachment_part(path).await?);
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.as_str())
        .multipart(parts)
        .map_err(|e| NotifyError::Build(e.to_string()))
}

/// Sends mail through an authenticated STARTTLS relay.
pub struct SmtpMailer {
    config: SmtpConfig,
    user: String,
    password: String,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, user: String, password: String) -> Self {
        Self {
            config,
            user,
            password,
        }
    }

    fn recipient(&self) -> &str {
        self.config.to.as_deref().unwrap_or(&self.user)
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let message = build_message(&self.user, self.recipient(), mail).await?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| NotifyError::Transport {
                channel: Channel::Email,
                message: format!("SMTP relay: {}", e),
            })?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(self.user.clone(), self.password.clone()))
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)))
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::Transport {
                channel: Channel::Email,
                message: format!("SMTP send: {}", e),
            })?;

        info!("Email sent to {}: {}", self.recipient(), mail.subject);
        Ok(())
    }
}
