//! Change-feed watcher.
//!
//! A [`CollectionWatcher`] owns the subscription to one collection's change
//! feed. Each record is decoded through the watcher's schema adapter and the
//! resulting event is handed to every registered handler in order.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use docwatch_proto::OperationKind;

use crate::error::Error;
use crate::feed::{decode_record, ChangeRecord, WatchedCollection};
use crate::handler::{CollectionHandle, EventHandler};
use crate::schema::SchemaAdapter;

/// Watches one collection and dispatches its changes to handlers.
pub struct CollectionWatcher<A: SchemaAdapter> {
    collection: Arc<dyn WatchedCollection>,
    adapter: A,
    handlers: Vec<Arc<dyn EventHandler<A::Model>>>,
}

impl<A: SchemaAdapter> CollectionWatcher<A> {
    /// Create a watcher without handlers.
    pub fn new(collection: Arc<dyn WatchedCollection>, adapter: A) -> Self {
        Self {
            collection,
            adapter,
            handlers: Vec::new(),
        }
    }

    /// Register a handler. Handlers run in registration order.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler<A::Model>>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Name of the watched collection.
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Names of the registered handlers, in order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run the watcher until `shutdown` is cancelled or the feed ends.
    ///
    /// Handler setup and the subscription happen first; a failure in either
    /// is returned before any record is consumed. Afterwards only a fatal
    /// feed error ends the watcher with `Err`, and the caller is expected to
    /// restart it. Falling behind the feed is fatal: the skipped records are
    /// gone and handler state is only rebuilt by a fresh setup.
    pub async fn watch(&self, shutdown: CancellationToken) -> Result<(), Error> {
        let span = info_span!("watcher", collection = self.collection.name());
        self.run(shutdown).instrument(span).await
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), Error> {
        let handle = SnapshotHandle {
            collection: self.collection.as_ref(),
            adapter: &self.adapter,
        };

        for handler in &self.handlers {
            if let Err(e) = handler.setup(&handle).await {
                error!(handler = handler.name(), error = %e, "handler setup failed");
                return Err(e);
            }
        }

        let mut stream = match self.collection.watch(&OperationKind::ALL).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to subscribe to change feed");
                return Err(e);
            }
        };

        info!(handlers = ?self.handler_names(), "watching change feed");

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("watcher shutting down");
                    break Ok(());
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(record)) => self.dispatch(record).await,
                Some(Err(e)) if e.is_recoverable() => {
                    warn!(error = %e, "skipping unreadable change record");
                }
                Some(Err(e)) => {
                    error!(error = %e, "change feed failed");
                    break Err(e);
                }
                None => {
                    info!("change feed ended");
                    break Ok(());
                }
            }
        };

        if let Err(e) = stream.close().await {
            warn!(error = %e, "failed to close change stream");
        }

        result
    }

    async fn dispatch(&self, record: ChangeRecord) {
        let sequence = record.sequence;
        let event = match decode_record(&self.adapter, record) {
            Ok(event) => event,
            Err(e) => {
                warn!(sequence, error = %e, "skipping change record");
                return;
            }
        };

        debug!(sequence, key = event.key(), kind = %event.kind(), "dispatching event");

        for handler in &self.handlers {
            if let Err(e) = handler.handle_event(&event).await {
                warn!(
                    handler = handler.name(),
                    key = event.key(),
                    kind = %event.kind(),
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }
}

/// Collection view handed to handlers during setup.
struct SnapshotHandle<'a, A> {
    collection: &'a dyn WatchedCollection,
    adapter: &'a A,
}

#[async_trait]
impl<A: SchemaAdapter> CollectionHandle<A::Model> for SnapshotHandle<'_, A> {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn snapshot(&self) -> Result<Vec<(String, A::Model)>, Error> {
        let raw = self.collection.find_all().await?;
        let mut documents = Vec::with_capacity(raw.len());

        for raw in raw {
            let document = self.adapter.decode(raw)?;
            let id = self.adapter.id(&document);
            documents.push((id, self.adapter.to_model(document)));
        }

        Ok(documents)
    }
}
