//! Quota-governed notification channels.
//!
//! Two independent channels, push (LINE Messaging API) and email (SMTP), each
//! behind a transport trait. [`NotificationDispatcher`] applies the daily
//! quota to both and keeps a failure on one from blocking the other.

mod dispatcher;
mod line;
mod mail;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use line::{LineConfig, LinePushClient};
pub use mail::{build_message, OutgoingMail, SmtpConfig, SmtpMailer};

use async_trait::async_trait;
use thiserror::Error;

use crate::quota::Channel;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{channel} daily limit ({limit}) reached, not sending")]
    QuotaExhausted { channel: Channel, limit: u32 },

    #[error("{0} channel is not configured")]
    NotConfigured(&'static str),

    #[error("{channel} transport failed: {message}")]
    Transport { channel: Channel, message: String },

    #[error("{channel} rejected the message: HTTP {status}: {body}")]
    Rejected {
        channel: Channel,
        status: u16,
        body: String,
    },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Cannot read attachment {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl NotifyError {
    /// Worth another attempt within the same run.
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Transport { .. } => true,
            NotifyError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Delivers a short text message.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(&self, text: &str) -> Result<(), NotifyError>;
}

/// Delivers an email with optional attachments.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError>;
}
