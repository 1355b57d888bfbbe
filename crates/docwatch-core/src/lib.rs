//! docwatch core - change-feed watcher, event handlers and document store.
//!
//! A [`CollectionWatcher`] subscribes to one collection's change feed,
//! decodes each record into a generic [`Event`] through a [`SchemaAdapter`],
//! and hands it to its [`EventHandler`]s in registration order. Two handlers
//! are provided: [`CacheEventHandler`] keeps a [`Cache`] in sync with the
//! collection and [`TransportEventHandler`] publishes the change to a
//! room-addressed [`Transport`](docwatch_transport::Transport).
//!
//! [`DocumentStore`] is an embedded sled-backed store whose collections
//! implement the [`WatchedCollection`] feed contract.

pub mod cache;
pub mod error;
pub mod feed;
pub mod handler;
pub mod room;
pub mod schema;
pub mod store;
pub mod watcher;

pub use cache::{Cache, CacheStats, MemoryCache};
pub use error::Error;
pub use feed::{ChangeRecord, ChangeStream, DocumentKey, RawDocument, WatchedCollection};
pub use handler::{CacheEventHandler, CollectionHandle, EventHandler, TransportEventHandler};
pub use room::RoomTemplate;
pub use schema::{JsonDocument, JsonSchema, SchemaAdapter};
pub use store::{Collection, DocumentStore, DEFAULT_FEED_CAPACITY};
pub use watcher::CollectionWatcher;

/// Re-export protocol types.
pub use docwatch_proto as proto;
pub use docwatch_proto::{Event, Message, OperationKind};
