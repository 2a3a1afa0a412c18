//! Delivery request and result types.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Error string reported when every channel in the priority order failed.
pub const QUEUED_FOR_RETRY: &str = "QUEUED_FOR_RETRY";

/// Bytes per megabyte used by size based routing rules.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Sensitivity tier of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    #[default]
    Low,
    Med,
    High,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Med => "med",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "med" | "medium" => Ok(Self::Med),
            "high" => Ok(Self::High),
            other => Err(Error::Other(format!("Unknown sensitivity: {}", other))),
        }
    }
}

/// Routing metadata attached to every send.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub tenant_id: String,
    pub usecase: String,
    pub sensitivity: Sensitivity,
    pub size_bytes: u64,
    pub idempotency_key: String,
}

impl Metadata {
    /// Payload size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// A single logical delivery request.
///
/// `body` is produced upstream by the encryption service. It is passed to the
/// channels untouched and never logged.
#[derive(Clone)]
pub struct SendInput {
    /// Channel specific destination (chat id, email address, URL).
    pub to: String,
    pub subject: Option<String>,
    pub body: Bytes,
    pub metadata: Metadata,
}

impl SendInput {
    pub fn new(to: impl Into<String>, body: impl Into<Bytes>, metadata: Metadata) -> Self {
        Self {
            to: to.into(),
            subject: None,
            body: body.into(),
            metadata,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl fmt::Debug for SendInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendInput")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("body_len", &self.body.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// What a channel hands back after accepting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: String,
}

impl SendReceipt {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Outcome of `send_with_failover`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl SendResult {
    pub fn delivered(receipt: SendReceipt, transport: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: Some(receipt.id),
            error: None,
            transport_used: Some(transport.into()),
            retry_after_seconds: None,
        }
    }

    pub fn queued(retry_after_seconds: u64) -> Self {
        Self {
            ok: false,
            id: None,
            error: Some(QUEUED_FOR_RETRY.to_string()),
            transport_used: None,
            retry_after_seconds: Some(retry_after_seconds),
        }
    }

    pub fn is_queued(&self) -> bool {
        !self.ok && self.error.as_deref() == Some(QUEUED_FOR_RETRY)
    }
}
