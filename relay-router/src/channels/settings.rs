//! Channel credentials and endpoints.
//!
//! These live outside the routing document and are read from the
//! environment (a `.env` file is honoured by the binary).

use std::time::Duration;

use tracing::warn;

use super::{EmailConfig, TelegramConfig, WebhookConfig};

/// Settings for every reference channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub telegram: TelegramConfig,
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
}

impl ChannelSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Self::default();

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            settings.telegram.bot_token = token;
        }
        if let Some(base) = get("TELEGRAM_API_BASE") {
            settings.telegram.api_base = base;
        }
        settings.telegram.default_chat_id = get("TELEGRAM_DEFAULT_CHAT_ID");
        if let Some(timeout) = secs(&get, "TELEGRAM_TIMEOUT_SECS") {
            settings.telegram.timeout = timeout;
        }

        settings.email.relay_url = get("EMAIL_RELAY_URL");
        settings.email.from_address = get("EMAIL_FROM");
        if let Some(timeout) = secs(&get, "EMAIL_TIMEOUT_SECS") {
            settings.email.timeout = timeout;
        }

        if let Some(timeout) = secs(&get, "WEBHOOK_TIMEOUT_SECS") {
            settings.webhook.timeout = timeout;
        }
        if let Some(raw) = get("WEBHOOK_HEADERS") {
            settings.webhook.headers = parse_headers(&raw);
        }

        settings
    }
}

fn secs<G>(get: &G, key: &str) -> Option<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Some(Duration::from_secs(value)),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid timeout setting");
            None
        }
    }
}

/// Parse `Name: value; Other-Name: value` pairs. Malformed entries are skipped.
fn parse_headers(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                Some((name.trim().to_string(), value.trim().to_string()))
            }
            _ => {
                warn!(entry, "Ignoring malformed WEBHOOK_HEADERS entry");
                None
            }
        })
        .collect()
}
