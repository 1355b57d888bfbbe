//! Fan-out transport that aggregates child failures.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{trace, warn};

use docwatch_proto::Message;

use crate::error::{ChildFailure, CombinedError, Error};
use crate::Transport;

/// Forwards every message to an ordered list of child transports.
///
/// Every child is attempted, in order, whatever happened to the children
/// before it. A broken channel therefore never suppresses delivery through
/// the healthy ones; its failure is reported in the returned
/// [`CombinedError`] alongside any others.
#[derive(Default)]
pub struct CombinedTransport {
    children: Vec<Arc<dyn Transport>>,
}

impl CombinedTransport {
    /// Create a combined transport with no children.
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Append a child and return self.
    pub fn with_child(mut self, child: Arc<dyn Transport>) -> Self {
        self.children.push(child);
        self
    }

    /// Append a child.
    pub fn add_child(&mut self, child: Arc<dyn Transport>) {
        self.children.push(child);
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Names of the children, in order.
    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|child| child.name()).collect()
    }
}

#[async_trait]
impl Transport for CombinedTransport {
    async fn send_message(&self, message: &Message) -> Result<(), Error> {
        let mut failures = Vec::new();

        for (index, child) in self.children.iter().enumerate() {
            match child.send_message(message).await {
                Ok(()) => {
                    trace!(transport = child.name(), room = %message.room, "message delivered");
                }
                Err(error) => {
                    warn!(
                        transport = child.name(),
                        room = %message.room,
                        error = %error,
                        "transport failed to deliver message"
                    );
                    failures.push(ChildFailure {
                        index,
                        transport: child.name().to_string(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CombinedError::new(self.children.len(), failures).into())
        }
    }

    fn name(&self) -> &str {
        "combined"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct RecordingTransport {
        name: String,
        fail: bool,
        received: Mutex<Vec<Message>>,
    }

    impl RecordingTransport {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<Message> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_message(&self, message: &Message) -> Result<(), Error> {
            self.received.lock().unwrap().push(message.clone());
            if self.fail {
                Err(Error::Status {
                    status: 503,
                    message: format!("{} unavailable", self.name),
                })
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn message() -> Message {
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), "abc123".to_string());
        Message::new("docs.abc123", "delete", data)
    }

    #[tokio::test]
    async fn test_empty_combined_succeeds() {
        let combined = CombinedTransport::new();
        assert!(combined.is_empty());
        assert!(combined.send_message(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_all_children_receive_message() {
        let first = RecordingTransport::new("first", false);
        let second = RecordingTransport::new("second", false);
        let combined = CombinedTransport::new()
            .with_child(first.clone())
            .with_child(second.clone());

        combined.send_message(&message()).await.unwrap();

        assert_eq!(first.received(), vec![message()]);
        assert_eq!(second.received(), vec![message()]);
    }

    #[tokio::test]
    async fn test_partial_failure_reaches_every_child() {
        let first = RecordingTransport::new("first", false);
        let second = RecordingTransport::new("second", true);
        let third = RecordingTransport::new("third", false);

        let mut combined = CombinedTransport::new();
        combined.add_child(first.clone());
        combined.add_child(second.clone());
        combined.add_child(third.clone());
        assert_eq!(combined.len(), 3);

        let err = combined.send_message(&message()).await.unwrap_err();

        assert_eq!(first.received().len(), 1);
        assert_eq!(second.received().len(), 1);
        assert_eq!(third.received().len(), 1);

        let Error::Combined(combined_err) = err else {
            panic!("expected a combined error");
        };
        assert_eq!(combined_err.attempted(), 3);
        let failures = combined_err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].transport, "second");
        assert!(matches!(
            failures[0].error,
            Error::Status { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_every_failure_is_kept() {
        let combined = CombinedTransport::new()
            .with_child(RecordingTransport::new("a", true))
            .with_child(RecordingTransport::new("b", false))
            .with_child(RecordingTransport::new("c", true));

        let err = combined.send_message(&message()).await.unwrap_err();
        let Error::Combined(combined_err) = err else {
            panic!("expected a combined error");
        };
        let indexes: Vec<usize> = combined_err
            .into_failures()
            .into_iter()
            .map(|failure| failure.index)
            .collect();
        assert_eq!(indexes, vec![0, 2]);
    }

    #[test]
    fn test_child_names() {
        let combined = CombinedTransport::new()
            .with_child(RecordingTransport::new("broadcaster", false))
            .with_child(RecordingTransport::new("push", false));
        assert_eq!(combined.child_names(), vec!["broadcaster", "push"]);
    }
}
