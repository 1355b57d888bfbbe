//! A single collection and its change feed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sled::Tree;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

use docwatch_proto::OperationKind;

use super::WriteSequence;
use crate::error::Error;
use crate::feed::{ChangeRecord, ChangeStream, RawDocument, WatchedCollection};
use crate::schema::JsonDocument;

/// Handle onto one collection of a [`DocumentStore`](super::DocumentStore).
///
/// Cloning is cheap; clones share the tree and the change feed.
#[derive(Clone)]
pub struct Collection {
    name: Arc<str>,
    tree: Tree,
    feed: broadcast::Sender<ChangeRecord>,
    writes: Arc<Mutex<WriteSequence>>,
}

impl Collection {
    pub(super) fn new(
        name: String,
        tree: Tree,
        feed: broadcast::Sender<ChangeRecord>,
        writes: Arc<Mutex<WriteSequence>>,
    ) -> Self {
        Self {
            name: name.into(),
            tree,
            feed,
            writes,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a new document and return it as stored.
    ///
    /// The identifier is read from `id` or `_id` and stored under `id`.
    pub fn insert(&self, document: Value) -> Result<Value, Error> {
        let document = JsonDocument::from_value(document)?;
        let id = document.id.clone();
        let stored = document.into_value();
        let bytes = serde_json::to_vec(&stored)?;

        let mut writes = self.writes.lock();
        if self.tree.contains_key(id.as_bytes())? {
            return Err(Error::DocumentExists(id));
        }
        self.tree.insert(id.as_bytes(), bytes)?;
        self.publish(writes.next(), OperationKind::Insert, &id, Some(stored.clone()));

        Ok(stored)
    }

    /// Merge the top-level fields of `patch` into a stored document.
    ///
    /// Identifier fields in the patch are ignored.
    pub fn update(&self, id: &str, patch: Value) -> Result<Value, Error> {
        let Value::Object(patch) = patch else {
            return Err(Error::InvalidDocument(
                "patch must be a JSON object".to_string(),
            ));
        };

        let mut writes = self.writes.lock();
        let Some(Value::Object(mut merged)) = self.read(id)? else {
            return Err(Error::DocumentNotFound(id.to_string()));
        };

        for (field, value) in patch {
            if field != "id" && field != "_id" {
                merged.insert(field, value);
            }
        }

        let stored = Value::Object(merged);
        self.tree.insert(id.as_bytes(), serde_json::to_vec(&stored)?)?;
        self.publish(writes.next(), OperationKind::Update, id, Some(stored.clone()));

        Ok(stored)
    }

    /// Replace a stored document wholesale.
    ///
    /// The new document may omit its identifier. Every identifier it
    /// carries, under `_id` or `id`, must equal `id`.
    pub fn replace(&self, id: &str, document: Value) -> Result<Value, Error> {
        let stored = normalize_replacement(id, document)?;
        let bytes = serde_json::to_vec(&stored)?;

        let mut writes = self.writes.lock();
        if !self.tree.contains_key(id.as_bytes())? {
            return Err(Error::DocumentNotFound(id.to_string()));
        }
        self.tree.insert(id.as_bytes(), bytes)?;
        self.publish(writes.next(), OperationKind::Replace, id, Some(stored.clone()));

        Ok(stored)
    }

    /// Remove a document. Returns whether one was stored.
    pub fn delete(&self, id: &str) -> Result<bool, Error> {
        let mut writes = self.writes.lock();
        if self.tree.remove(id.as_bytes())?.is_none() {
            return Ok(false);
        }
        self.publish(writes.next(), OperationKind::Delete, id, None);
        Ok(true)
    }

    /// Look up a document.
    pub fn get(&self, id: &str) -> Result<Option<Value>, Error> {
        self.read(id)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Every stored document, in identifier order.
    pub fn all(&self) -> Result<Vec<Value>, Error> {
        self.tree
            .iter()
            .values()
            .map(|bytes| -> Result<Value, Error> { Ok(serde_json::from_slice(&bytes?)?) })
            .collect()
    }

    /// Open a change stream delivering records of the given kinds.
    pub fn subscribe(&self, kinds: &[OperationKind]) -> BroadcastChangeStream {
        BroadcastChangeStream {
            collection: self.name.clone(),
            receiver: self.feed.subscribe(),
            kinds: kinds.to_vec(),
        }
    }

    /// Number of open change streams.
    pub fn subscriber_count(&self) -> usize {
        self.feed.receiver_count()
    }

    fn read(&self, id: &str) -> Result<Option<Value>, Error> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn publish(&self, sequence: u64, kind: OperationKind, id: &str, document: Option<Value>) {
        let record = ChangeRecord::new(sequence, kind, id, document);
        match self.feed.send(record) {
            Ok(subscribers) => trace!(
                collection = %self.name,
                sequence,
                kind = %kind,
                subscribers,
                "change published"
            ),
            Err(_) => trace!(collection = %self.name, sequence, "change published without subscribers"),
        }
    }
}

fn normalize_replacement(id: &str, document: Value) -> Result<Value, Error> {
    let Value::Object(mut fields) = document else {
        return Err(Error::InvalidDocument(
            "document must be a JSON object".to_string(),
        ));
    };

    for key in ["_id", "id"] {
        let Some(carried) = fields.remove(key) else {
            continue;
        };
        let matches = match &carried {
            Value::String(s) => s == id,
            Value::Number(n) => n.to_string() == id,
            _ => false,
        };
        if !matches {
            return Err(Error::InvalidDocument(format!(
                "document {} {} does not match {}",
                key, carried, id
            )));
        }
    }

    let mut normalized = Map::with_capacity(fields.len() + 1);
    normalized.insert("id".to_string(), Value::String(id.to_string()));
    normalized.extend(fields);

    Ok(JsonDocument::from_value(Value::Object(normalized))?.into_value())
}

#[async_trait]
impl WatchedCollection for Collection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_all(&self) -> Result<Vec<RawDocument>, Error> {
        self.all()
    }

    async fn watch(&self, kinds: &[OperationKind]) -> Result<Box<dyn ChangeStream>, Error> {
        debug!(collection = %self.name, ?kinds, "opening change stream");
        Ok(Box::new(self.subscribe(kinds)))
    }
}

/// Change stream over a collection's broadcast feed.
///
/// A subscriber that falls more than the feed capacity behind gets
/// [`Error::Lagged`]; the records it missed cannot be replayed.
pub struct BroadcastChangeStream {
    collection: Arc<str>,
    receiver: broadcast::Receiver<ChangeRecord>,
    kinds: Vec<OperationKind>,
}

#[async_trait]
impl ChangeStream for BroadcastChangeStream {
    async fn next(&mut self) -> Option<Result<ChangeRecord, Error>> {
        loop {
            match self.receiver.recv().await {
                Ok(record) if record.matches(&self.kinds) => return Some(Ok(record)),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => return Some(Err(Error::Lagged(skipped))),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        debug!(collection = %self.collection, "change stream closed");
        Ok(())
    }
}
