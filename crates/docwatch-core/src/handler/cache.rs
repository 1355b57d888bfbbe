//! Keeps a cache in sync with a collection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use docwatch_proto::Event;

use super::{CollectionHandle, EventHandler};
use crate::cache::Cache;
use crate::error::Error;

/// Writes inserted, updated and replaced documents into a cache and evicts
/// deleted ones.
///
/// Writes are last-write-wins; the feed order is trusted. With preheat
/// enabled, setup loads the full collection into the cache and fails if any
/// document cannot be stored, since a partially filled cache would serve
/// misses for documents that exist.
pub struct CacheEventHandler<T> {
    cache: Arc<dyn Cache<T>>,
    preheat: bool,
}

impl<T> CacheEventHandler<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cache handler.
    pub fn new(cache: Arc<dyn Cache<T>>, preheat: bool) -> Self {
        Self { cache, preheat }
    }

    /// Whether setup preheats the cache.
    pub fn preheat(&self) -> bool {
        self.preheat
    }
}

#[async_trait]
impl<T> EventHandler<T> for CacheEventHandler<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "cache"
    }

    async fn setup(&self, collection: &dyn CollectionHandle<T>) -> Result<(), Error> {
        if !self.preheat {
            return Ok(());
        }

        let preheat_error = |source: Error| Error::Preheat {
            collection: collection.name().to_string(),
            source: Box::new(source),
        };

        let documents = collection.snapshot().await.map_err(preheat_error)?;
        let count = documents.len();

        for (key, document) in documents {
            self.cache.set(&key, document).await.map_err(preheat_error)?;
        }

        info!(collection = collection.name(), count, "cache preheated");
        Ok(())
    }

    async fn handle_event(&self, event: &Event<T>) -> Result<(), Error> {
        if event.kind().is_delete() {
            debug!(key = event.key(), "evicting cache entry");
            return self.cache.delete(event.key()).await;
        }

        let document = event.document().ok_or_else(|| Error::MissingDocument {
            operation: event.kind(),
            key: event.key().to_string(),
        })?;

        debug!(key = event.key(), kind = %event.kind(), "caching document");
        self.cache.set(event.key(), document.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use docwatch_proto::OperationKind;

    struct FixedCollection {
        documents: Vec<(String, u32)>,
        fail: bool,
    }

    #[async_trait]
    impl CollectionHandle<u32> for FixedCollection {
        fn name(&self) -> &str {
            "numbers"
        }

        async fn snapshot(&self) -> Result<Vec<(String, u32)>, Error> {
            if self.fail {
                return Err(Error::Subscription("snapshot unavailable".to_string()));
            }
            Ok(self.documents.clone())
        }
    }

    struct FailingCache;

    #[async_trait]
    impl Cache<u32> for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<u32>, Error> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: u32) -> Result<(), Error> {
            Err(Error::Cache("cache is read-only".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    fn handler(cache: &Arc<MemoryCache<u32>>, preheat: bool) -> CacheEventHandler<u32> {
        CacheEventHandler::new(cache.clone(), preheat)
    }

    #[tokio::test]
    async fn test_upserts_write_cache() {
        let cache = Arc::new(MemoryCache::new());
        let handler = handler(&cache, false);

        handler.handle_event(&Event::insert("a", 1)).await.unwrap();
        handler
            .handle_event(&Event::upsert(OperationKind::Replace, "a", 2).unwrap())
            .await
            .unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let cache = Arc::new(MemoryCache::new());
        let handler = handler(&cache, false);
        let event = Event::insert("a", 7);

        handler.handle_event(&event).await.unwrap();
        let once = cache.keys();
        handler.handle_event(&event).await.unwrap();

        assert_eq!(cache.keys(), once);
        assert_eq!(cache.get("a").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_delete_evicts() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("a", 1).await.unwrap();
        let handler = handler(&cache, false);

        handler.handle_event(&Event::delete("a")).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);

        // Deleting again is not an error.
        handler.handle_event(&Event::delete("a")).await.unwrap();
    }

    #[tokio::test]
    async fn test_preheat_loads_snapshot() {
        let cache = Arc::new(MemoryCache::new());
        let collection = FixedCollection {
            documents: vec![("A".into(), 1), ("B".into(), 2), ("C".into(), 3)],
            fail: false,
        };

        handler(&cache, true).setup(&collection).await.unwrap();

        assert_eq!(cache.keys(), vec!["A", "B", "C"]);
        assert_eq!(cache.get("B").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_setup_without_preheat_is_noop() {
        let cache = Arc::new(MemoryCache::new());
        let collection = FixedCollection {
            documents: vec![("A".into(), 1)],
            fail: true,
        };

        handler(&cache, false).setup(&collection).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_preheat_snapshot_failure_is_fatal() {
        let cache = Arc::new(MemoryCache::new());
        let collection = FixedCollection {
            documents: vec![],
            fail: true,
        };

        let err = handler(&cache, true).setup(&collection).await.unwrap_err();
        assert!(matches!(err, Error::Preheat { ref collection, .. } if collection == "numbers"));
    }

    #[tokio::test]
    async fn test_preheat_cache_failure_is_fatal() {
        let handler = CacheEventHandler::new(Arc::new(FailingCache), true);
        let collection = FixedCollection {
            documents: vec![("A".into(), 1)],
            fail: false,
        };

        let err = handler.setup(&collection).await.unwrap_err();
        match err {
            Error::Preheat { source, .. } => assert!(matches!(*source, Error::Cache(_))),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
