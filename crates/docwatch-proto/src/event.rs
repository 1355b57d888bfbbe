//! Normalized mutation events.
//!
//! Every record read from a collection's change feed is turned into exactly
//! one [`Event`], regardless of how the underlying store names or shapes the
//! operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of mutation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A new document was inserted.
    Insert,
    /// An existing document was partially updated.
    Update,
    /// An existing document was replaced wholesale.
    Replace,
    /// A document was deleted.
    Delete,
}

impl OperationKind {
    /// Every kind a watcher subscribes to, in wire order.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Replace,
        OperationKind::Delete,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Replace => "replace",
            OperationKind::Delete => "delete",
        }
    }

    /// Whether this kind removes the document.
    pub fn is_delete(&self) -> bool {
        matches!(self, OperationKind::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(OperationKind::Insert),
            "update" => Ok(OperationKind::Update),
            "replace" => Ok(OperationKind::Replace),
            "delete" => Ok(OperationKind::Delete),
            other => Err(Error::UnsupportedOperation(other.to_string())),
        }
    }
}

/// A normalized mutation of one document.
///
/// The document is present for insert, update and replace events and absent
/// for deletes. The constructors uphold that invariant, so handlers can rely
/// on [`Event::document`] being `Some` whenever the kind is not
/// [`OperationKind::Delete`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event<T> {
    kind: OperationKind,
    key: String,
    document: Option<T>,
}

impl<T> Event<T> {
    /// Create an insert, update or replace event carrying the new document.
    pub fn upsert(kind: OperationKind, key: impl Into<String>, document: T) -> Result<Self, Error> {
        if kind.is_delete() {
            return Err(Error::InvalidEvent(
                "delete events cannot carry a document".to_string(),
            ));
        }
        Ok(Self {
            kind,
            key: key.into(),
            document: Some(document),
        })
    }

    /// Create an insert event.
    pub fn insert(key: impl Into<String>, document: T) -> Self {
        Self {
            kind: OperationKind::Insert,
            key: key.into(),
            document: Some(document),
        }
    }

    /// Create a delete event. The post-state of a deleted document is unknown.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            key: key.into(),
            document: None,
        }
    }

    /// The kind of mutation.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Identifier of the mutated document.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The document after the mutation, `None` for deletes.
    pub fn document(&self) -> Option<&T> {
        self.document.as_ref()
    }

    /// Consume the event, returning the document.
    pub fn into_document(self) -> Option<T> {
        self.document
    }
}
