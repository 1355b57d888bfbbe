//! Watched collection overview.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Cache counters of one collection.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSummary {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// One watched collection.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub documents: usize,
    pub global_room: String,
    pub cache: CacheSummary,
}

/// Collection routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/collections", get(list_collections))
}

async fn list_collections(State(state): State<AppState>) -> Json<Vec<CollectionSummary>> {
    let summaries = state
        .collections()
        .map(|(name, watched)| {
            let stats = watched.cache.stats();
            CollectionSummary {
                name: name.clone(),
                documents: watched.collection.len(),
                global_room: watched.rooms.global_room().to_string(),
                cache: CacheSummary {
                    entries: watched.cache.len(),
                    hits: stats.hits(),
                    misses: stats.misses(),
                    writes: stats.writes(),
                    evictions: stats.evictions(),
                    hit_rate: stats.hit_rate(),
                },
            }
        })
        .collect();

    Json(summaries)
}
