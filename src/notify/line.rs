//! LINE Messaging API push client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{NotifyError, PushTransport};
use crate::quota::Channel;

const DEFAULT_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> PushRequest<'a> {
    fn text(to: &'a str, text: &'a str) -> Self {
        Self {
            to,
            messages: vec![TextMessage { kind: "text", text }],
        }
    }
}

/// Pushes text messages to a single LINE user.
pub struct LinePushClient {
    config: LineConfig,
    token: String,
    user_id: String,
    client: Client,
}

impl LinePushClient {
    pub fn new(config: LineConfig, token: String, user_id: String) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Build(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            token,
            user_id,
            client,
        })
    }
}

#[async_trait]
impl PushTransport for LinePushClient {
    async fn push(&self, text: &str) -> Result<(), NotifyError> {
        debug!("POST {} ({} chars)", self.config.endpoint, text.chars().count());
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.token)
            .json(&PushRequest::text(&self.user_id, text))
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                channel: Channel::Push,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                channel: Channel::Push,
                status: status.as_u16(),
                body,
            });
        }

        info!("LINE message sent");
        Ok(())
    }
}
