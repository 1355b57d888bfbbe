//! Core error types.

use thiserror::Error;

use docwatch_proto::OperationKind;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protocol error, such as an unsupported operation type.
    #[error("protocol error: {0}")]
    Protocol(#[from] docwatch_proto::Error),

    /// Delivery through a transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] docwatch_transport::Error),

    /// The cache rejected an operation.
    #[error("cache error: {0}")]
    Cache(String),

    /// A non-delete change record arrived without its document.
    #[error("{operation} record for {key} carries no document")]
    MissingDocument { operation: OperationKind, key: String },

    /// A document does not have the shape the store requires.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Insert of an identifier that is already stored.
    #[error("document {0} already exists")]
    DocumentExists(String),

    /// Update, replace or lookup of an identifier that is not stored.
    #[error("document {0} not found")]
    DocumentNotFound(String),

    /// The subscriber fell behind and records were dropped from the feed.
    ///
    /// The skipped mutations are lost, so caches fed by the subscription
    /// are no longer complete.
    #[error("change feed lagged, {0} records skipped")]
    Lagged(u64),

    /// The change feed subscription is broken.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// The cache could not be populated before watching.
    #[error("failed to preheat cache for {collection}: {source}")]
    Preheat {
        collection: String,
        #[source]
        source: Box<Error>,
    },

    /// A room pattern is unusable.
    #[error("invalid room template: {0}")]
    RoomTemplate(String),
}

impl Error {
    /// Whether a watcher can skip the record that produced this error and
    /// keep consuming its feed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Serialization(_)
                | Error::Protocol(_)
                | Error::MissingDocument { .. }
                | Error::InvalidDocument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::MissingDocument {
            operation: OperationKind::Update,
            key: "a".to_string()
        }
        .is_recoverable());
        assert!(Error::Protocol(docwatch_proto::Error::UnsupportedOperation(
            "drop".to_string()
        ))
        .is_recoverable());

        assert!(!Error::Subscription("closed".to_string()).is_recoverable());
        assert!(!Error::Lagged(3).is_recoverable());
        assert!(!Error::Preheat {
            collection: "docs".to_string(),
            source: Box::new(Error::Cache("full".to_string())),
        }
        .is_recoverable());
    }

    #[test]
    fn test_preheat_message_includes_cause() {
        let err = Error::Preheat {
            collection: "docs".to_string(),
            source: Box::new(Error::Cache("full".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "failed to preheat cache for docs: cache error: full"
        );
    }
}
