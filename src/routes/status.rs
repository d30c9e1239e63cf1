//! Health and cache statistics

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use evcal_core::CacheStats;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/cache/stats", get(cache_stats))
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub events: usize,
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        events: state.store.event_count(),
    })
}

/// GET /cache/stats
async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.engine.cache_stats())
}
