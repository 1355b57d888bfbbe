//! Transport error types.

use std::fmt;

use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP request could not be sent or its body not read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote end answered with a non-success status.
    #[error("delivery rejected with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The remote end answered with a body that could not be understood.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credentials could not be loaded or exchanged for a token.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The transport was configured with unusable settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// One or more children of a combined transport failed.
    #[error(transparent)]
    Combined(#[from] CombinedError),
}

/// The failure of one child of a [`CombinedTransport`](crate::CombinedTransport).
#[derive(Debug)]
pub struct ChildFailure {
    /// Position of the child in the combined transport.
    pub index: usize,
    /// Name reported by the child.
    pub transport: String,
    /// The child's error.
    pub error: Error,
}

/// Aggregate of every child failure of one combined send.
///
/// Failures are kept in child order; none is dropped in favor of another.
#[derive(Debug)]
pub struct CombinedError {
    attempted: usize,
    failures: Vec<ChildFailure>,
}

impl CombinedError {
    /// Create an aggregate from the failures of `attempted` children.
    pub fn new(attempted: usize, failures: Vec<ChildFailure>) -> Self {
        Self { attempted, failures }
    }

    /// Number of children the message was handed to.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// The individual failures, in child order.
    pub fn failures(&self) -> &[ChildFailure] {
        &self.failures
    }

    /// Consume the aggregate, returning the individual failures.
    pub fn into_failures(self) -> Vec<ChildFailure> {
        self.failures
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} transports failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(
                f,
                "; [{}] {}: {}",
                failure.index, failure.transport, failure.error
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for CombinedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|failure| &failure.error as &(dyn std::error::Error + 'static))
    }
}
