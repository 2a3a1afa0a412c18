//! Email delivery channel.
//!
//! Hands the payload to an HTTP mail relay as a base64 attachment. The relay
//! owns SMTP; this channel only needs a 2xx answer.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::DeliveryChannel;
use crate::config::EMAIL;
use crate::message::{Metadata, SendInput, SendReceipt};
use crate::utils::http_client::{build_client, error_body_excerpt, transport_error};
use crate::{Error, Result};

const ATTACHMENT_NAME: &str = "payload.bin";
const DEFAULT_SUBJECT: &str = "Encrypted message";

/// Email channel configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Relay endpoint accepting the JSON envelope.
    pub relay_url: Option<String>,
    /// Sender address.
    pub from_address: Option<String>,
    pub timeout: Duration,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            from_address: None,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    attachment: Attachment,
    metadata: &'a Metadata,
}

#[derive(Debug, Serialize)]
struct Attachment {
    filename: &'static str,
    content_type: &'static str,
    content_base64: String,
}

/// Email delivery channel.
pub struct EmailChannel {
    config: EmailConfig,
    client: Client,
}

impl EmailChannel {
    /// Create a new email channel.
    pub fn new(config: EmailConfig) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn relay(&self) -> Option<(&str, &str)> {
        let url = self.config.relay_url.as_deref().filter(|s| !s.is_empty())?;
        let from = self.config.from_address.as_deref().filter(|s| !s.is_empty())?;
        Some((url, from))
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn name(&self) -> &str {
        EMAIL
    }

    async fn health(&self) -> Result<bool> {
        Ok(self.relay().is_some())
    }

    async fn send(&self, input: &SendInput) -> Result<SendReceipt> {
        let (url, from) = self
            .relay()
            .ok_or_else(|| Error::send(EMAIL, "mail relay not configured"))?;

        let to = input.to.trim();
        if to.is_empty() || !to.contains('@') {
            return Err(Error::InvalidDestination(format!(
                "not an email address: '{}'",
                input.to
            )));
        }

        let message = RelayMessage {
            from,
            to,
            subject: input.subject.as_deref().unwrap_or(DEFAULT_SUBJECT),
            attachment: Attachment {
                filename: ATTACHMENT_NAME,
                content_type: "application/octet-stream",
                content_base64: STANDARD.encode(&input.body),
            },
            metadata: &input.metadata,
        };

        let response = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|e| transport_error(EMAIL, self.config.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body_excerpt(response).await;
            warn!(status = %status, "Mail relay rejected message: {}", body);
            return Err(Error::send(
                EMAIL,
                format!("relay returned {} - {}", status, body),
            ));
        }

        let id = format!("{}:{}", EMAIL, uuid::Uuid::new_v4());
        debug!(id = %id, "Email handed to relay");
        Ok(SendReceipt::new(id))
    }
}
