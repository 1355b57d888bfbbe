//! HTTP broadcaster transport.
//!
//! The broadcaster is a socket fan-out service that accepts messages on
//! `POST <base_url>/dispatch`, authenticated by a shared secret sent in the
//! `key` header, and relays them to the sockets joined to the message's room.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use docwatch_proto::{DispatchRequest, DispatchResponse, Message};

use crate::error::Error;
use crate::Transport;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the shared secret.
pub const KEY_HEADER: &str = "key";

/// Broadcaster connection settings.
#[derive(Clone)]
pub struct BroadcasterConfig {
    /// Base URL of the broadcaster, without the `/dispatch` suffix.
    pub base_url: String,
    /// Shared secret.
    pub key: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl BroadcasterConfig {
    /// Create a configuration with the default timeout.
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            key: key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the dispatch endpoint.
    pub fn dispatch_url(&self) -> String {
        format!("{}/dispatch", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for BroadcasterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcasterConfig")
            .field("base_url", &self.base_url)
            .field("key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Transport that POSTs messages to an HTTP broadcaster.
#[derive(Debug)]
pub struct BroadcasterTransport {
    config: BroadcasterConfig,
    dispatch_url: String,
    client: Client,
}

impl BroadcasterTransport {
    /// Create a broadcaster transport.
    pub fn new(config: BroadcasterConfig) -> Result<Self, Error> {
        if config.base_url.is_empty() {
            return Err(Error::Config("broadcaster base url is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            dispatch_url: config.dispatch_url(),
            config,
            client,
        })
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &BroadcasterConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for BroadcasterTransport {
    async fn send_message(&self, message: &Message) -> Result<(), Error> {
        let body = DispatchRequest::from(message);

        debug!(
            url = %self.dispatch_url,
            room = %message.room,
            event = %message.event,
            "dispatching message to broadcaster"
        );

        let response = self
            .client
            .post(&self.dispatch_url)
            .header(KEY_HEADER, &self.config.key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let parsed = serde_json::from_slice::<DispatchResponse>(&bytes);

        if status == StatusCode::OK {
            return parsed
                .map(|_| ())
                .map_err(|e| Error::MalformedResponse(e.to_string()));
        }

        let message = match parsed {
            Ok(DispatchResponse {
                error: Some(error), ..
            }) => error,
            Ok(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        };

        Err(Error::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn name(&self) -> &str {
        "broadcaster"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_url_trims_trailing_slash() {
        let config = BroadcasterConfig::new("http://localhost:3000/", "secret");
        assert_eq!(config.dispatch_url(), "http://localhost:3000/dispatch");

        let config = BroadcasterConfig::new("http://localhost:3000", "secret");
        assert_eq!(config.dispatch_url(), "http://localhost:3000/dispatch");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = BroadcasterConfig::new("http://localhost:3000", "super-secret");
        let text = format!("{:?}", config);
        assert!(!text.contains("super-secret"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn test_default_timeout() {
        let config = BroadcasterConfig::new("http://localhost:3000", "secret");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let config = config.with_timeout(Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let result = BroadcasterTransport::new(BroadcasterConfig::new("", "secret"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
