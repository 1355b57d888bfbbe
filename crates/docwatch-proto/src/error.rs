//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The change record named an operation outside the supported set.
    #[error("unsupported operation type: {0}")]
    UnsupportedOperation(String),

    /// An event was built in a shape that breaks the document/delete invariant.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A document payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
