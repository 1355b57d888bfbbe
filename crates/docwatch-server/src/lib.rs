//! docwatch server.
//!
//! Opens the embedded document store, runs one change-feed watcher per
//! configured collection and serves a small HTTP API over the store. Reads
//! go through each collection's cache; writes go to the store, and the
//! watchers propagate them to the cache and the configured transports.

pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;

pub use config::{Args, ServerConfig, WatchSpec};
pub use error::{AppError, Error};
pub use runtime::{build_transport, supervise, Runtime};

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use docwatch_core::{Collection, MemoryCache, RoomTemplate};

/// A watched collection as seen by the HTTP API.
#[derive(Clone)]
pub struct CollectionState {
    /// Store handle.
    pub collection: Collection,
    /// Cache kept in sync by the collection's watcher.
    pub cache: Arc<MemoryCache<Value>>,
    /// Rooms changes are published to.
    pub rooms: RoomTemplate,
}

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    collections: Arc<BTreeMap<String, CollectionState>>,
}

impl AppState {
    /// Create application state over the given collections.
    pub fn new(collections: BTreeMap<String, CollectionState>) -> Self {
        Self {
            collections: Arc::new(collections),
        }
    }

    /// Look up a watched collection.
    pub fn collection(&self, name: &str) -> Result<&CollectionState, AppError> {
        self.collections
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("collection {} is not watched", name)))
    }

    /// Every watched collection, by name.
    pub fn collections(&self) -> impl Iterator<Item = (&String, &CollectionState)> {
        self.collections.iter()
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::collections::routes())
        .merge(routes::documents::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
