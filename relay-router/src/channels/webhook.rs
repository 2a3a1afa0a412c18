//! Generic webhook delivery channel.
//!
//! The destination of each send is the webhook URL itself.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use super::DeliveryChannel;
use crate::config::WEBHOOK;
use crate::message::{Metadata, SendInput, SendReceipt};
use crate::utils::http_client::{build_client, error_body_excerpt, transport_error};
use crate::{Error, Result};

/// Webhook channel configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub timeout: Duration,
    /// Extra headers sent with every request (`WEBHOOK_HEADERS` in the
    /// environment, as `Name: value; Other: value`).
    pub headers: Vec<(String, String)>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookEnvelope<'a> {
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    encrypted_payload: String,
    metadata: &'a Metadata,
}

/// Webhook delivery channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
    headers: HeaderMap,
}

impl WebhookChannel {
    /// Create a new webhook channel.
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|e| Error::config(format!("Invalid webhook header '{}': {}", key, e)))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| Error::config(format!("Invalid value for header '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        Ok(Self {
            config,
            client,
            headers,
        })
    }
}

/// Parse a destination into an http(s) URL with a host.
fn parse_destination(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::InvalidDestination(format!("'{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidDestination(format!(
            "'{}': unsupported scheme '{}'",
            raw,
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidDestination(format!("'{}': missing host", raw)));
    }
    Ok(url)
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        WEBHOOK
    }

    async fn health(&self) -> Result<bool> {
        // Every send names its own URL, so there is nothing to check up front.
        Ok(true)
    }

    async fn send(&self, input: &SendInput) -> Result<SendReceipt> {
        let url = parse_destination(&input.to)?;
        let host = url.host_str().unwrap_or_default().to_string();

        let envelope = WebhookEnvelope {
            timestamp: Utc::now().to_rfc3339(),
            subject: input.subject.as_deref(),
            encrypted_payload: STANDARD.encode(&input.body),
            metadata: &input.metadata,
        };

        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| transport_error(WEBHOOK, self.config.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body_excerpt(response).await;
            warn!(status = %status, host = %host, "Webhook request failed: {}", body);
            return Err(Error::send(
                WEBHOOK,
                format!("endpoint returned {} - {}", status, body),
            ));
        }

        debug!(host = %host, "Webhook delivered");
        Ok(SendReceipt::new(format!(
            "{}:{}:{}",
            WEBHOOK,
            host,
            Utc::now().timestamp_millis()
        )))
    }
}
