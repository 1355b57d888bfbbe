//! Topic-based push notifications through Firebase Cloud Messaging.
//!
//! Each message is sent to the FCM topic named by its room, with the message
//! data map as the notification's data fields.

mod token;

pub use token::{
    ServiceAccountKey, ServiceAccountTokenSource, StaticToken, TokenSource, DEFAULT_TOKEN_URI,
    MESSAGING_SCOPE,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docwatch_proto::Message;

use crate::error::Error;
use crate::Transport;

/// Default FCM API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SendRequest<'a> {
    message: PushMessage<'a>,
}

#[derive(Serialize)]
struct PushMessage<'a> {
    topic: &'a str,
    data: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Transport that publishes messages to FCM topics.
pub struct PushTransport {
    client: Client,
    send_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl PushTransport {
    /// Create a transport for `project_id` against the public FCM endpoint.
    pub fn new(project_id: &str, tokens: Arc<dyn TokenSource>) -> Result<Self, Error> {
        Self::with_endpoint(DEFAULT_ENDPOINT, project_id, tokens)
    }

    /// Create a transport against a specific FCM-compatible endpoint.
    pub fn with_endpoint(
        endpoint: &str,
        project_id: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, Error> {
        if project_id.is_empty() {
            return Err(Error::Config("push project id is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                endpoint.trim_end_matches('/'),
                project_id
            ),
            tokens,
        })
    }

    /// Create a transport from a base64-encoded service-account key file.
    pub fn from_base64_credentials(credentials: &str) -> Result<Self, Error> {
        let key = ServiceAccountKey::from_base64(credentials)?;
        let project_id = key.project_id.clone();
        let tokens = Arc::new(ServiceAccountTokenSource::new(key)?);
        Self::new(&project_id, tokens)
    }

    /// URL messages are posted to.
    pub fn send_url(&self) -> &str {
        &self.send_url
    }
}

#[async_trait]
impl Transport for PushTransport {
    async fn send_message(&self, message: &Message) -> Result<(), Error> {
        let token = self.tokens.access_token().await?;
        let body = SendRequest {
            message: PushMessage {
                topic: message.topic(),
                data: &message.data,
            },
        };

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            let sent: SendResponse = serde_json::from_slice(&bytes)
                .map_err(|e| Error::MalformedResponse(e.to_string()))?;
            debug!(topic = message.topic(), name = %sent.name, "push message sent");
            return Ok(());
        }

        let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());

        Err(Error::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn name(&self) -> &str {
        "push"
    }
}
