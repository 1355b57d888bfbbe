//! Wiring of store, caches, transports and watchers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use docwatch_core::{
    CacheEventHandler, CollectionWatcher, DocumentStore, JsonSchema, MemoryCache,
    TransportEventHandler,
};
use docwatch_transport::{
    BroadcasterTransport, CombinedTransport, PushTransport, ServiceAccountTokenSource,
};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::{create_router, AppState, CollectionState};

/// Interval between subscription checks while watchers start.
const STARTUP_POLL: Duration = Duration::from_millis(10);

/// Outcome of one watcher task.
pub type WatcherOutcome = (String, Result<(), docwatch_core::Error>);

/// Build the combined transport from the configured delivery channels.
pub fn build_transport(config: &ServerConfig) -> Result<CombinedTransport, Error> {
    let mut combined = CombinedTransport::new();

    if let Some(broadcaster) = &config.broadcaster {
        info!(url = %broadcaster.base_url, "broadcaster delivery enabled");
        combined.add_child(Arc::new(BroadcasterTransport::new(broadcaster.clone())?));
    }

    if let Some(key) = &config.push_key {
        info!(project = %key.project_id, endpoint = %config.push_endpoint, "push delivery enabled");
        let tokens = Arc::new(ServiceAccountTokenSource::new(key.clone())?);
        combined.add_child(Arc::new(PushTransport::with_endpoint(
            &config.push_endpoint,
            &key.project_id,
            tokens,
        )?));
    }

    if combined.is_empty() {
        warn!("no delivery channel configured, changes will only update caches");
    }

    Ok(combined)
}

/// A configured server, ready to run.
pub struct Runtime {
    config: ServerConfig,
    store: Arc<DocumentStore>,
    transport: Arc<CombinedTransport>,
    collections: BTreeMap<String, CollectionState>,
}

impl Runtime {
    /// Open the store at the configured data path and set up every watch.
    pub fn open(config: ServerConfig) -> Result<Self, Error> {
        let store = DocumentStore::open(&config.data_path)?;
        Self::with_store(config, store)
    }

    /// Set up every watch over an already opened store.
    pub fn with_store(config: ServerConfig, store: DocumentStore) -> Result<Self, Error> {
        config.validate()?;

        let store = Arc::new(store.with_feed_capacity(config.feed_capacity));
        let transport = Arc::new(build_transport(&config)?);

        let mut collections = BTreeMap::new();
        for watch in &config.watches {
            let state = CollectionState {
                collection: store.collection(&watch.collection)?,
                cache: Arc::new(MemoryCache::new()),
                rooms: watch.rooms.clone(),
            };
            collections.insert(watch.collection.clone(), state);
        }

        Ok(Self {
            config,
            store,
            transport,
            collections,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// The transport every watcher publishes through.
    pub fn transport(&self) -> &Arc<CombinedTransport> {
        &self.transport
    }

    /// HTTP API state.
    pub fn state(&self) -> AppState {
        AppState::new(self.collections.clone())
    }

    /// Build one watcher per collection, with the cache handler first and
    /// the transport handler second.
    pub fn watchers(&self) -> Vec<CollectionWatcher<JsonSchema>> {
        self.collections
            .values()
            .map(|state| {
                let cache = CacheEventHandler::new(state.cache.clone(), self.config.preheat);
                let publish =
                    TransportEventHandler::new(self.transport.clone(), state.rooms.clone())
                        .with_global_room(self.config.global_room);

                CollectionWatcher::new(Arc::new(state.collection.clone()), JsonSchema)
                    .with_handler(Arc::new(cache))
                    .with_handler(Arc::new(publish))
            })
            .collect()
    }

    /// Spawn every watcher on its own task.
    pub fn spawn_watchers(&self, shutdown: &CancellationToken) -> JoinSet<WatcherOutcome> {
        let mut tasks = JoinSet::new();

        for watcher in self.watchers() {
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                let result = watcher.watch(shutdown).await;
                (watcher.collection_name().to_string(), result)
            });
        }

        tasks
    }

    /// Wait until every watcher has subscribed to its change feed.
    ///
    /// Handler setup, preheat included, runs before a watcher subscribes, so
    /// once this returns every later write reaches every watcher. A watcher
    /// that fails first ends the wait with its error. Returns early when
    /// `shutdown` is cancelled.
    pub async fn wait_until_watching(
        &self,
        tasks: &mut JoinSet<WatcherOutcome>,
        shutdown: &CancellationToken,
    ) -> Result<(), Error> {
        let mut pending: BTreeSet<&str> = self.collections.keys().map(String::as_str).collect();

        loop {
            pending.retain(|name| {
                self.collections
                    .get(*name)
                    .is_some_and(|state| state.collection.subscriber_count() == 0)
            });
            if pending.is_empty() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                joined = tasks.join_next() => match joined {
                    Some(Ok((collection, Ok(())))) => {
                        info!(collection = %collection, "watcher stopped before subscribing");
                        pending.remove(collection.as_str());
                    }
                    Some(Ok((collection, Err(source)))) => {
                        return Err(Error::Watcher { collection, source });
                    }
                    Some(Err(e)) => return Err(Error::WatcherTask(e.to_string())),
                    None => return Ok(()),
                },
                _ = tokio::time::sleep(STARTUP_POLL) => {}
            }
        }
    }

    /// Run every watcher and serve the HTTP API until `shutdown` is
    /// cancelled or a watcher fails.
    ///
    /// The API only starts once every watcher is subscribed.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Error> {
        let mut watchers = self.spawn_watchers(&shutdown);
        info!(collections = watchers.len(), "watchers started");

        if let Err(err) = self.wait_until_watching(&mut watchers, &shutdown).await {
            error!(error = %err, "watcher failed during startup");
            shutdown.cancel();
            if let Err(e) = supervise(watchers, shutdown).await {
                warn!(error = %e, "another watcher failed during startup");
            }
            self.store.flush().await?;
            return Err(err);
        }
        info!("all watchers subscribed");

        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        info!(listen = %self.config.listen_addr, "HTTP API listening");

        let app = create_router(self.state());
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
            }
        });

        let result = supervise(watchers, shutdown.clone()).await;

        // Watchers that end cleanly leave the API up until shutdown.
        shutdown.cancelled().await;

        match server.await {
            Ok(Ok(())) => info!("HTTP API stopped"),
            Ok(Err(e)) => warn!(error = %e, "HTTP API stopped with error"),
            Err(e) => warn!(error = %e, "HTTP API task failed"),
        }

        self.store.flush().await?;
        result
    }
}

/// Wait for every watcher task.
///
/// The first failing watcher cancels `shutdown` so the others stop too; its
/// error is returned once all tasks have finished.
pub async fn supervise(
    mut tasks: JoinSet<WatcherOutcome>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let mut failure = None;

    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok((collection, Ok(()))) => {
                info!(collection = %collection, "watcher stopped");
                continue;
            }
            Ok((collection, Err(source))) => Error::Watcher { collection, source },
            Err(e) => Error::WatcherTask(e.to_string()),
        };

        error!(error = %err, "watcher failed, stopping all watchers");
        shutdown.cancel();
        failure.get_or_insert(err);
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
