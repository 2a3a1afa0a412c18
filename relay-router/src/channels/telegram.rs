//! Telegram Bot API delivery channel.
//!
//! Uploads the encrypted payload as a document via
//! `POST /bot<token>/sendDocument`. Rate limits (429) are not retried here;
//! they are reported as failures so the router can move on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use super::DeliveryChannel;
use crate::config::TELEGRAM;
use crate::message::{SendInput, SendReceipt};
use crate::utils::http_client::{ERROR_BODY_LIMIT, build_client, read_body_capped, transport_error};
use crate::utils::text::truncate_chars;
use crate::{Error, Result};

/// Telegram document caption limit (UTF-8 characters).
const TELEGRAM_CAPTION_LIMIT: usize = 1024;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Largest Bot API response body read; real answers are a few hundred bytes.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// File name the payload is uploaded under.
const DOCUMENT_NAME: &str = "payload.bin";

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// API base URL, overridable for self-hosted Bot API servers.
    pub api_base: String,
    /// Chat used when a send has no destination.
    pub default_chat_id: Option<String>,
    pub timeout: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            default_chat_id: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Response envelope of the Bot API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<ApiMessage>,
    #[serde(default)]
    parameters: Option<ApiParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiParameters {
    retry_after: Option<u64>,
}

/// Telegram delivery channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn is_configured(&self) -> bool {
        !self.config.bot_token.is_empty()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendDocument",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    /// Destination chat, falling back to the configured default.
    fn chat_id<'a>(&'a self, input: &'a SendInput) -> Result<&'a str> {
        let to = input.to.trim();
        if !to.is_empty() {
            return Ok(to);
        }
        self.config
            .default_chat_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::InvalidDestination(
                    "no Telegram chat id given and no default chat configured".to_string(),
                )
            })
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    fn name(&self) -> &str {
        TELEGRAM
    }

    async fn health(&self) -> Result<bool> {
        Ok(self.is_configured())
    }

    async fn send(&self, input: &SendInput) -> Result<SendReceipt> {
        if !self.is_configured() {
            return Err(Error::send(TELEGRAM, "bot token not configured"));
        }
        let chat_id = self.chat_id(input)?.to_string();

        let document = Part::bytes(input.body.to_vec())
            .file_name(DOCUMENT_NAME)
            .mime_str("application/octet-stream")?;
        let mut form = Form::new().text("chat_id", chat_id).part("document", document);
        if let Some(subject) = input.subject.as_deref().filter(|s| !s.is_empty()) {
            form = form.text("caption", truncate_chars(subject, TELEGRAM_CAPTION_LIMIT));
        }

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(TELEGRAM, self.config.timeout, e))?;

        let status = response.status();
        let text = read_body_capped(response, MAX_RESPONSE_BYTES).await;
        let body: Option<ApiResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() || !body.as_ref().is_some_and(|b| b.ok) {
            let description = body
                .as_ref()
                .and_then(|b| b.description.as_deref())
                .unwrap_or(text.trim());
            let description = truncate_chars(description, ERROR_BODY_LIMIT);
            let mut message = format!("sendDocument failed: {} - {}", status, description);
            if let Some(retry_after) = body
                .as_ref()
                .and_then(|b| b.parameters.as_ref())
                .and_then(|p| p.retry_after)
            {
                message.push_str(&format!(" (rate limited, retry_after={}s)", retry_after));
            }
            warn!(status = %status, "Telegram {}", message);
            return Err(Error::send(TELEGRAM, message));
        }

        let message_id = body
            .and_then(|b| b.result)
            .map(|m| m.message_id)
            .ok_or_else(|| Error::send(TELEGRAM, "response did not contain a message id"))?;

        debug!(message_id, "Telegram document sent");
        Ok(SendReceipt::new(format!("{}:{}", TELEGRAM, message_id)))
    }
}
