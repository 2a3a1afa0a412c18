//! Delivery channels.
//!
//! This module provides the channels the router can fail over between:
//! - Telegram Bot API (document upload)
//! - Email relay (HTTP mail relay)
//! - Generic webhooks (HTTP POST)

mod email;
mod settings;
mod telegram;
mod webhook;

pub use email::{EmailChannel, EmailConfig};
pub use settings::ChannelSettings;
pub use telegram::{TelegramChannel, TelegramConfig};
pub use webhook::{WebhookChannel, WebhookConfig};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::message::{SendInput, SendReceipt};
use crate::{Error, Result};

/// Trait for delivery channels.
///
/// Implementations report failures through their return values. The router
/// also guards against panics, but a channel should never rely on that.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Name used in priority lists, breaker keys and audit events.
    fn name(&self) -> &str;

    /// Cheap liveness check, usually just "is the channel configured".
    async fn health(&self) -> Result<bool>;

    /// Deliver the payload.
    async fn send(&self, input: &SendInput) -> Result<SendReceipt>;
}

/// Channels known to the router, looked up by name.
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn DeliveryChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its own name.
    pub fn register(&mut self, channel: Arc<dyn DeliveryChannel>) -> Result<()> {
        let name = channel.name().to_string();
        if self.channels.contains_key(&name) {
            return Err(Error::Other(format!("Channel already registered: {}", name)));
        }
        info!(channel = %name, "Registered delivery channel");
        self.channels.insert(name, channel);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, channel: Arc<dyn DeliveryChannel>) -> Result<Self> {
        self.register(channel)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DeliveryChannel>> {
        self.channels.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<Arc<dyn DeliveryChannel>> {
        self.get(name)
            .ok_or_else(|| Error::ChannelNotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Build the registry of reference channels from settings.
///
/// All three channels are always registered; an unconfigured channel simply
/// reports itself unhealthy so the router skips it.
pub fn build_channels(settings: &ChannelSettings) -> Result<ChannelRegistry> {
    let registry = ChannelRegistry::new()
        .with(Arc::new(TelegramChannel::new(settings.telegram.clone())?))?
        .with(Arc::new(EmailChannel::new(settings.email.clone())?))?
        .with(Arc::new(WebhookChannel::new(settings.webhook.clone())?))?;

    info!(
        channels = ?registry.names(),
        "Delivery channels initialized"
    );
    Ok(registry)
}
