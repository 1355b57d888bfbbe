//! Event handlers.
//!
//! Handlers are registered on a watcher at construction time and invoked in
//! registration order for every event of the watched collection.

mod cache;
mod transport;

pub use cache::CacheEventHandler;
pub use transport::TransportEventHandler;

use async_trait::async_trait;

use docwatch_proto::Event;

use crate::error::Error;

/// A watched collection as seen by handlers during setup.
///
/// Documents are already decoded into the domain model.
#[async_trait]
pub trait CollectionHandle<T>: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Every document currently stored, keyed by identifier.
    async fn snapshot(&self) -> Result<Vec<(String, T)>, Error>;
}

/// A consumer of normalized events.
#[async_trait]
pub trait EventHandler<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// One-time initialization, run before the watcher subscribes.
    ///
    /// An error here aborts the watcher.
    async fn setup(&self, collection: &dyn CollectionHandle<T>) -> Result<(), Error>;

    /// Process one event. Errors are logged by the watcher and otherwise
    /// ignored; they never stop the feed.
    async fn handle_event(&self, event: &Event<T>) -> Result<(), Error>;
}
