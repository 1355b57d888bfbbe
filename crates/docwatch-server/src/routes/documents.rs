//! Document endpoints.
//!
//! Writes go straight to the store; the collection's watcher then updates
//! the cache and publishes the change. Reads are served from the cache and
//! fall back to the store on a miss. Only the watcher writes the cache, so a
//! read can never store a document after its delete was applied.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::debug;

use docwatch_core::Cache;

use crate::error::AppError;
use crate::AppState;

/// Document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/collections/:name/documents", post(insert_document))
        .route(
            "/collections/:name/documents/:id",
            get(get_document)
                .put(replace_document)
                .patch(update_document)
                .delete(delete_document),
        )
}

async fn get_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let watched = state.collection(&name)?;

    if let Some(document) = watched.cache.get(&id).await? {
        return Ok(Json(document));
    }

    debug!(collection = %name, id = %id, "cache miss, reading store");
    let document = watched
        .collection
        .get(&id)?
        .ok_or_else(|| AppError::NotFound(format!("document {} not found", id)))?;

    Ok(Json(document))
}

async fn insert_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(document): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let watched = state.collection(&name)?;
    let stored = watched.collection.insert(document)?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn replace_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(document): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let watched = state.collection(&name)?;
    Ok(Json(watched.collection.replace(&id, document)?))
}

async fn update_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let watched = state.collection(&name)?;
    Ok(Json(watched.collection.update(&id, patch)?))
}

async fn delete_document(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let watched = state.collection(&name)?;
    if watched.collection.delete(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("document {} not found", id)))
    }
}
