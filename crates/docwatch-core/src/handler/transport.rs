//! Publishes changes to a room-addressed transport.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use docwatch_proto::{data_keys, Event, Message};
use docwatch_transport::Transport;

use super::{CollectionHandle, EventHandler};
use crate::error::Error;
use crate::room::RoomTemplate;

/// Turns each event into a [`Message`] for the document's room and sends it.
///
/// Deletes carry the key under `id`; every other operation carries the
/// JSON-serialized document under `payload`. With the global room enabled
/// the same message is sent a second time to the collection's global room,
/// but only after the per-document send succeeded.
pub struct TransportEventHandler<T> {
    transport: Arc<dyn Transport>,
    rooms: RoomTemplate,
    dispatch_global: bool,
    _model: PhantomData<fn(&T)>,
}

impl<T> TransportEventHandler<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Create a handler publishing to per-document rooms only.
    pub fn new(transport: Arc<dyn Transport>, rooms: RoomTemplate) -> Self {
        Self {
            transport,
            rooms,
            dispatch_global: false,
            _model: PhantomData,
        }
    }

    /// Also publish every change to the global room.
    pub fn with_global_room(mut self, enabled: bool) -> Self {
        self.dispatch_global = enabled;
        self
    }

    /// Room template in use.
    pub fn rooms(&self) -> &RoomTemplate {
        &self.rooms
    }

    /// Build the per-document message for an event.
    pub fn build_message(&self, event: &Event<T>) -> Result<Message, Error> {
        let mut data = BTreeMap::new();

        match event.document() {
            Some(document) if !event.kind().is_delete() => {
                data.insert(
                    data_keys::PAYLOAD.to_string(),
                    serde_json::to_string(document)?,
                );
            }
            None if !event.kind().is_delete() => {
                return Err(Error::MissingDocument {
                    operation: event.kind(),
                    key: event.key().to_string(),
                });
            }
            _ => {
                data.insert(data_keys::ID.to_string(), event.key().to_string());
            }
        }

        Ok(Message::new(
            self.rooms.room_for(event.key()),
            event.kind().as_str(),
            data,
        ))
    }
}

#[async_trait]
impl<T> EventHandler<T> for TransportEventHandler<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "transport"
    }

    async fn setup(&self, collection: &dyn CollectionHandle<T>) -> Result<(), Error> {
        info!(
            collection = collection.name(),
            transport = self.transport.name(),
            global_room = ?self.dispatch_global.then(|| self.rooms.global_room()),
            "publishing collection changes"
        );
        Ok(())
    }

    async fn handle_event(&self, event: &Event<T>) -> Result<(), Error> {
        let message = self.build_message(event)?;

        debug!(room = %message.room, event = %message.event, "dispatching change");
        self.transport.send_message(&message).await?;

        if self.dispatch_global {
            let global = message.with_room(self.rooms.global_room());
            debug!(room = %global.room, event = %global.event, "dispatching change");
            self.transport.send_message(&global).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docwatch_proto::OperationKind;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Message>>,
        fail_rooms: Vec<String>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_message(&self, message: &Message) -> Result<(), docwatch_transport::Error> {
            if self.fail_rooms.contains(&message.room) {
                return Err(docwatch_transport::Error::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_publishes_payload() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = TransportEventHandler::new(transport.clone(), RoomTemplate::prefix("docs"));

        let event = Event::insert("abc123", json!({ "id": "abc123", "title": "hello" }));
        handler.handle_event(&event).await.unwrap();

        let sent = transport.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].room, "docs.abc123");
        assert_eq!(sent[0].event, "insert");

        let payload: Value = serde_json::from_str(&sent[0].data["payload"]).unwrap();
        assert_eq!(payload, json!({ "id": "abc123", "title": "hello" }));
    }

    #[tokio::test]
    async fn test_delete_publishes_id() {
        let transport = Arc::new(RecordingTransport::default());
        let handler =
            TransportEventHandler::<Value>::new(transport.clone(), RoomTemplate::prefix("docs"));

        handler.handle_event(&Event::delete("abc123")).await.unwrap();

        let sent = transport.sent.lock().clone();
        assert_eq!(
            sent,
            vec![Message::new("docs.abc123", "delete", data(&[("id", "abc123")]))]
        );
    }

    #[tokio::test]
    async fn test_global_room_follows_document_room() {
        let transport = Arc::new(RecordingTransport::default());
        let handler = TransportEventHandler::new(transport.clone(), RoomTemplate::prefix("docs"))
            .with_global_room(true);

        let event = Event::upsert(OperationKind::Update, "abc123", json!({ "id": "abc123" }))
            .unwrap();
        handler.handle_event(&event).await.unwrap();

        let rooms: Vec<String> = transport
            .sent
            .lock()
            .iter()
            .map(|m| m.room.clone())
            .collect();
        assert_eq!(rooms, vec!["docs.abc123", "docs"]);

        let sent = transport.sent.lock().clone();
        assert_eq!(sent[0].data, sent[1].data);
        assert_eq!(sent[1].event, "update");
    }

    #[tokio::test]
    async fn test_document_room_failure_skips_global_room() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
            fail_rooms: vec!["docs.abc123".to_string()],
        });
        let handler = TransportEventHandler::new(transport.clone(), RoomTemplate::prefix("docs"))
            .with_global_room(true);

        let err = handler
            .handle_event(&Event::insert("abc123", json!({ "id": "abc123" })))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_build_message_with_pattern() {
        let transport = Arc::new(RecordingTransport::default());
        let rooms = RoomTemplate::new("tenant/{key}", "tenant").unwrap();
        let handler = TransportEventHandler::new(transport, rooms);

        let message = handler
            .build_message(&Event::upsert(OperationKind::Replace, "7", json!({ "id": "7" })).unwrap())
            .unwrap();

        assert_eq!(message.room, "tenant/7");
        assert_eq!(message.event, "replace");
        assert!(message.data.contains_key("payload"));
        assert!(!message.data.contains_key("id"));
    }
}
