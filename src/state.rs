use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use evcal_core::{CalendarCache, EngineConfig, InMemoryStore, QueryEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub store: Arc<InMemoryStore>,
}

impl AppState {
    /// Load the dataset at `data_path` and wire the engine's cache to the
    /// store's mutation bus.
    pub fn load(data_path: &Path, config: &EngineConfig) -> Result<Self> {
        let store = InMemoryStore::load(data_path, config)
            .with_context(|| format!("Failed to load events from {}", data_path.display()))?;
        Ok(AppState::from_store(Arc::new(store), config))
    }

    pub fn from_store(store: Arc<InMemoryStore>, config: &EngineConfig) -> Self {
        let cache = CalendarCache::new(&config.cache, store.bus().subscribe());
        let engine = QueryEngine::new(store.clone(), cache, config);

        AppState {
            engine: Arc::new(engine),
            store,
        }
    }
}
