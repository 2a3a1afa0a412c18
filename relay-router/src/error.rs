//! Crate-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
///
/// None of these are fatal to the process. The router turns every channel
/// level error into an audit event and moves on to the next channel.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load routing configuration: {0}")]
    ConfigLoad(String),

    #[error("Channel not registered: {0}")]
    ChannelNotRegistered(String),

    #[error("Channel {channel} is unhealthy: {reason}")]
    ChannelUnhealthy { channel: String, reason: String },

    #[error("{channel} send failed: {message}")]
    ChannelSend { channel: String, message: String },

    #[error("{channel} request timed out after {}s", after.as_secs())]
    Timeout { channel: String, after: Duration },

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("All channels exhausted: {}", attempted.join(", "))]
    AllChannelsExhausted { attempted: Vec<String> },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigLoad(msg.into())
    }

    pub fn send(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ChannelSend {
            channel: channel.into(),
            message: message.into(),
        }
    }

    pub fn unhealthy(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChannelUnhealthy {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from a request that never got an answer.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
