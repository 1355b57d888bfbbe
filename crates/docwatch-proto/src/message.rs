//! Room-addressed messages and the broadcaster wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known keys of [`Message::data`].
pub mod data_keys {
    /// Serialized document of an insert, update or replace.
    pub const PAYLOAD: &str = "payload";
    /// Identifier of a deleted document.
    pub const ID: &str = "id";
    /// Mirror of the room, added by the HTTP broadcaster.
    pub const TOPIC: &str = "topic";
}

/// A message addressed to a room.
///
/// The data map is deliberately flat and string-keyed so that every
/// transport can carry it without knowing the document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Logical channel the message is addressed to.
    pub room: String,
    /// Operation name (`insert`, `update`, `replace`, `delete`).
    pub event: String,
    /// String payload fields.
    pub data: BTreeMap<String, String>,
}

impl Message {
    /// Create a new message.
    pub fn new(
        room: impl Into<String>,
        event: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            room: room.into(),
            event: event.into(),
            data,
        }
    }

    /// Return a copy of this message addressed to another room.
    pub fn with_room(&self, room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            event: self.event.clone(),
            data: self.data.clone(),
        }
    }

    /// Delivery topic for topic-routed transports. Always equal to the room.
    pub fn topic(&self) -> &str {
        &self.room
    }
}

/// Body POSTed to a broadcaster's `/dispatch` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Operation name.
    pub event: String,
    /// Data fields, including the `topic` mirror of the room.
    pub data: BTreeMap<String, String>,
    /// Target room.
    pub room: String,
}

impl From<&Message> for DispatchRequest {
    fn from(message: &Message) -> Self {
        let mut data = message.data.clone();
        data.insert(data_keys::TOPIC.to_string(), message.topic().to_string());
        Self {
            event: message.event.clone(),
            data,
            room: message.room.clone(),
        }
    }
}

/// Response returned by a broadcaster.
///
/// Successful responses may carry arbitrary fields; failures carry `error`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DispatchResponse {
    /// Error description on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Remaining fields of the response.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
