//! Change feed contract.
//!
//! A storage driver exposes each watchable collection as a
//! [`WatchedCollection`]: it can enumerate the current documents and open an
//! ordered [`ChangeStream`] of mutations that happen after subscription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docwatch_proto::{Event, OperationKind};

use crate::error::Error;
use crate::schema::SchemaAdapter;

/// A stored document before schema decoding.
pub type RawDocument = serde_json::Value;

/// Identifier of the document a change record refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Document identifier.
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
}

/// One record of a change feed, as produced by the storage driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Position of the record in the feed.
    #[serde(default)]
    pub sequence: u64,
    /// Operation name as reported by the store.
    pub operation_type: String,
    /// Identifier of the mutated document.
    pub document_key: DocumentKey,
    /// Document after the mutation; absent for deletes.
    #[serde(default)]
    pub full_document: Option<RawDocument>,
}

impl ChangeRecord {
    /// Create a record for a supported operation kind.
    pub fn new(
        sequence: u64,
        kind: OperationKind,
        id: impl Into<String>,
        full_document: Option<RawDocument>,
    ) -> Self {
        Self {
            sequence,
            operation_type: kind.as_str().to_string(),
            document_key: DocumentKey { id: id.into() },
            full_document,
        }
    }

    /// Whether the record's operation is one of `kinds`.
    pub fn matches(&self, kinds: &[OperationKind]) -> bool {
        kinds.iter().any(|kind| kind.as_str() == self.operation_type)
    }
}

/// An open subscription to a collection's change feed.
#[async_trait]
pub trait ChangeStream: Send {
    /// Wait for the next record.
    ///
    /// Returns `None` when the feed has ended. Errors for which
    /// [`Error::is_recoverable`] is true affect only the current record.
    async fn next(&mut self) -> Option<Result<ChangeRecord, Error>>;

    /// Release the subscription.
    async fn close(self: Box<Self>) -> Result<(), Error>;
}

/// A collection that can be snapshotted and watched.
#[async_trait]
pub trait WatchedCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Every document currently stored.
    async fn find_all(&self) -> Result<Vec<RawDocument>, Error>;

    /// Subscribe to mutations of the given kinds.
    async fn watch(&self, kinds: &[OperationKind]) -> Result<Box<dyn ChangeStream>, Error>;
}

/// Turn a change record into an event using `adapter`.
///
/// The event key always comes from the record's document key, so deletes
/// are keyed even though they carry no document.
pub fn decode_record<A>(adapter: &A, record: ChangeRecord) -> Result<Event<A::Model>, Error>
where
    A: SchemaAdapter,
{
    let kind: OperationKind = record.operation_type.parse()?;
    let key = record.document_key.id;

    if kind.is_delete() {
        return Ok(Event::delete(key));
    }

    let raw = record.full_document.ok_or_else(|| Error::MissingDocument {
        operation: kind,
        key: key.clone(),
    })?;
    let document = adapter.decode(raw)?;

    Ok(Event::upsert(kind, key, adapter.to_model(document))?)
}
