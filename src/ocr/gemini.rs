//! Google Gemini vision backend.
//!
//! Requires GEMINI_API_KEY. 429 responses are retried with exponential
//! backoff, honoring Retry-After when the API sends one. Those retries happen
//! inside a single logical call and cost one unit of daily quota.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{OcrError, VisionProvider};
use crate::retry::{backoff_delay, parse_retry_after};

/// Maximum retry attempts on rate limit errors.
const MAX_RETRIES: u32 = 5;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model name (e.g. "gemini-2.5-flash").
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base delay for 429 backoff in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_backoff_ms() -> u64 {
    1000
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            backoff_base_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Serialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

impl GeminiResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates?.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Gemini vision client.
pub struct GeminiProvider {
    config: GeminiConfig,
    api_key: Option<String>,
    client: Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, api_key: Option<String>) -> Result<Self, OcrError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<Option<String>, OcrError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            OcrError::MissingCredential(
                "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/".to_string(),
            )
        })?;

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: prompt.to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: mime_type.to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        },
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.1,
                max_output_tokens: 8192,
            },
        };

        let url = self.url();
        let mut attempt = 0;
        loop {
            debug!("Gemini request to {} (attempt {})", url, attempt + 1);
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| OcrError::Transport(format!("HTTP request failed: {}", e)))?;

            let status = response.status();
            if status.as_u16() == 429 {
                if attempt >= MAX_RETRIES {
                    return Err(OcrError::Api(format!(
                        "rate limited after {} retries",
                        MAX_RETRIES
                    )));
                }
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok());
                let wait = parse_retry_after(retry_after)
                    .unwrap_or_else(|| backoff_delay(attempt, self.config.backoff_base_ms));
                warn!(
                    "Gemini rate limited (attempt {}), waiting {:?}",
                    attempt + 1,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(OcrError::Api(format!("HTTP {}: {}", status, body)));
            }

            let parsed: GeminiResponse = response
                .json()
                .await
                .map_err(|e| OcrError::Api(format!("Failed to parse response: {}", e)))?;

            if let Some(error) = parsed.error {
                return Err(OcrError::Api(error.message));
            }

            return Ok(parsed.into_text());
        }
    }
}
