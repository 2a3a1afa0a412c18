use std::{sync::OnceLock, time::Duration};

use reqwest::{Client, Response};
use tracing::debug;

use super::text::truncate_chars;
use crate::{Error, Result};

/// Connection timeout applied to every outbound client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters of a failed response body kept in error messages.
pub const ERROR_BODY_LIMIT: usize = 512;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed a provider first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a client with a total request timeout.
pub fn build_client(timeout: Duration) -> Result<Client> {
    install_rustls_provider();
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .user_agent(concat!("relay-router/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport error to a channel error, keeping timeouts apart.
///
/// The request URL is stripped: it may carry credentials (Telegram puts the
/// bot token in the path).
pub fn transport_error(channel: &str, timeout: Duration, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            channel: channel.to_string(),
            after: timeout,
        }
    } else {
        Error::send(channel, format!("request failed: {}", error.without_url()))
    }
}

/// Read at most `max_bytes` of a response body, lossily decoded.
///
/// The rest of the body is never buffered.
pub async fn read_body_capped(mut response: Response, max_bytes: usize) -> String {
    let mut buf = Vec::new();
    while buf.len() < max_bytes {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (max_bytes - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e.without_url(), "Failed to read response body");
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Short excerpt of a failed response body for error messages.
pub async fn error_body_excerpt(response: Response) -> String {
    // Four bytes per char covers any UTF-8 text that fits the limit.
    let body = read_body_capped(response, ERROR_BODY_LIMIT * 4).await;
    truncate_chars(body.trim(), ERROR_BODY_LIMIT)
}
