//! Delivery transports for docwatch.
//!
//! A [`Transport`] delivers a room-addressed [`Message`] to one delivery
//! channel. [`CombinedTransport`] fans a message out to several channels and
//! aggregates their failures instead of stopping at the first one.
//!
//! Concrete channels:
//!
//! - [`BroadcasterTransport`] - POSTs messages to an HTTP broadcaster
//! - [`PushTransport`] - sends topic messages through Firebase Cloud Messaging

pub mod broadcaster;
pub mod combined;
pub mod error;
pub mod push;

pub use broadcaster::{BroadcasterConfig, BroadcasterTransport};
pub use combined::CombinedTransport;
pub use error::{ChildFailure, CombinedError, Error};
pub use push::{PushTransport, ServiceAccountKey, ServiceAccountTokenSource, StaticToken, TokenSource};

pub use docwatch_proto::Message;

use async_trait::async_trait;

/// A delivery channel for room-addressed messages.
///
/// Implementations must be safe to call from several watchers at once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one message.
    async fn send_message(&self, message: &Message) -> Result<(), Error>;

    /// Short name used in logs and aggregated errors.
    fn name(&self) -> &str;
}
