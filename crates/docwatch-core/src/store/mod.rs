//! Embedded document store.
//!
//! Collections are sled trees of JSON documents keyed by identifier. Every
//! successful mutation is numbered and published on the collection's change
//! feed, so a [`Collection`] can be watched like any other
//! [`WatchedCollection`](crate::feed::WatchedCollection).

mod collection;

pub use collection::{BroadcastChangeStream, Collection};

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use sled::Db;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Error;

/// Default number of records a change feed buffers per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Prefix of the sled tree holding a collection.
const COLLECTION_TREE_PREFIX: &str = "collection:";

/// Sequence numbering shared by every collection of a store.
///
/// Holding the lock for the duration of a write keeps sequence order and
/// storage order identical.
#[derive(Debug, Default)]
pub(crate) struct WriteSequence {
    last: u64,
}

impl WriteSequence {
    pub(crate) fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

/// An embedded store of JSON document collections.
pub struct DocumentStore {
    db: Db,
    feed_capacity: usize,
    collections: DashMap<String, Collection>,
    writes: Arc<Mutex<WriteSequence>>,
}

impl DocumentStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let db = sled::Config::new().path(path).use_compression(true).open()?;
        info!(path = %path.display(), recovered = db.was_recovered(), "document store opened");
        Ok(Self::with_db(db))
    }

    /// Create a store that is deleted when dropped.
    pub fn temporary() -> Result<Self, Error> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::with_db(db))
    }

    fn with_db(db: Db) -> Self {
        Self {
            db,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            collections: DashMap::new(),
            writes: Arc::new(Mutex::new(WriteSequence::default())),
        }
    }

    /// Set the per-subscriber buffer of change feeds opened after this call.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity.max(1);
        self
    }

    /// Per-subscriber change feed buffer.
    pub fn feed_capacity(&self) -> usize {
        self.feed_capacity
    }

    /// Open a collection, creating it if needed.
    ///
    /// Every call for the same name returns a handle onto the same tree and
    /// change feed.
    pub fn collection(&self, name: &str) -> Result<Collection, Error> {
        if name.is_empty() {
            return Err(Error::InvalidDocument(
                "collection name must not be empty".to_string(),
            ));
        }

        if let Some(collection) = self.collections.get(name) {
            return Ok(collection.clone());
        }

        let tree = self
            .db
            .open_tree(format!("{}{}", COLLECTION_TREE_PREFIX, name))?;
        let collection = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(collection = name, "collection opened");
                let (feed, _) = broadcast::channel(self.feed_capacity);
                Collection::new(name.to_string(), tree, feed, self.writes.clone())
            })
            .clone();

        Ok(collection)
    }

    /// Names of every collection stored on disk.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                std::str::from_utf8(&name)
                    .ok()
                    .and_then(|name| name.strip_prefix(COLLECTION_TREE_PREFIX))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// Flush pending writes to disk.
    pub async fn flush(&self) -> Result<(), Error> {
        self.db.flush_async().await?;
        Ok(())
    }
}
