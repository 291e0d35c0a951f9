use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{MailTransport, NotifyError, OutgoingMail, PushTransport};
use crate::quota::{Channel, QuotaLedger};

/// Outcome of one [`NotificationDispatcher::dispatch`].
#[derive(Debug)]
pub struct DispatchReport {
    pub push: Result<(), NotifyError>,
    pub email: Result<(), NotifyError>,
}

impl DispatchReport {
    pub fn all_sent(&self) -> bool {
        self.push.is_ok() && self.email.is_ok()
    }
}

pub const DEFAULT_SEND_ATTEMPTS: u32 = 2;
pub const DEFAULT_SEND_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Sends through the configured channels under the daily quota.
///
/// A slot is reserved before the transport call and committed only when the
/// transport reports success, so failed sends never consume budget. Transient
/// transport failures are retried against the same reservation.
#[derive(Clone)]
pub struct NotificationDispatcher {
    push: Option<Arc<dyn PushTransport>>,
    mail: Option<Arc<dyn MailTransport>>,
    quota: QuotaLedger,
    attempts: u32,
    retry_delay: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        push: Option<Arc<dyn PushTransport>>,
        mail: Option<Arc<dyn MailTransport>>,
        quota: QuotaLedger,
    ) -> Self {
        Self {
            push,
            mail,
            quota,
            attempts: DEFAULT_SEND_ATTEMPTS,
            retry_delay: DEFAULT_SEND_RETRY_DELAY,
        }
    }

    /// Override how often a transient send failure is retried.
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    async fn with_retries<F, Fut>(&self, channel: Channel, mut send: F) -> Result<(), NotifyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), NotifyError>>,
    {
        let mut attempt = 1;
        loop {
            match send().await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        "{} send attempt {}/{} failed: {}; retrying in {:?}",
                        channel, attempt, self.attempts, e, self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn reserve(&self, channel: Channel) -> Result<(), NotifyError> {
        if self.quota.check_and_reserve(channel).await {
            Ok(())
        } else {
            Err(NotifyError::QuotaExhausted {
                channel,
                limit: self.quota.limits().limit_for(channel),
            })
        }
    }

    async fn settle(&self, channel: Channel, result: &Result<(), NotifyError>) {
        if result.is_ok() {
            if let Err(e) = self.quota.commit(channel).await {
                warn!("Failed to persist {} quota: {}", channel, e);
            }
        } else {
            self.quota.release(channel).await;
        }
    }

    /// Send a push message.
    pub async fn send_push(&self, text: &str) -> Result<(), NotifyError> {
        let transport = self.push.as_ref().ok_or(NotifyError::NotConfigured("LINE"))?;
        self.reserve(Channel::Push).await?;
        let result = self
            .with_retries(Channel::Push, move || transport.push(text))
            .await;
        self.settle(Channel::Push, &result).await;
        result
    }

    /// Send an email.
    pub async fn send_email(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
        let transport = self
            .mail
            .as_ref()
            .ok_or(NotifyError::NotConfigured("email"))?;
        self.reserve(Channel::Email).await?;
        let result = self
            .with_retries(Channel::Email, move || transport.send(mail))
            .await;
        self.settle(Channel::Email, &result).await;
        result
    }

    /// Send an operational alert by email, logging rather than returning
    /// any failure.
    pub async fn send_alert(&self, mail: &OutgoingMail) -> bool {
        match self.send_email(mail).await {
            Ok(()) => {
                info!("Alert sent: {}", mail.subject);
                true
            }
            Err(e) => {
                warn!("Alert '{}' not sent: {}", mail.subject, e);
                false
            }
        }
    }

    /// Send on both channels. A failure on one does not stop the other.
    pub async fn dispatch(&self, push_text: &str, mail: &OutgoingMail) -> DispatchReport {
        let push = self.send_push(push_text).await;
        if let Err(e) = &push {
            warn!("Push notification failed: {}", e);
        }
        let email = self.send_email(mail).await;
        if let Err(e) = &email {
            warn!("Email notification failed: {}", e);
        }
        DispatchReport { push, email }
    }
}
