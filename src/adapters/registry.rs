//! Adapter registry
//!
//! In-memory mapping from source tag to its adapter. Constructed once at
//! startup and handed to the executor; tests inject fakes through
//! [`AdapterRegistry::register`] instead of reaching for global state.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::adapters::{GeniusAdapter, LastfmAdapter, SourceAdapter, SpotifyAdapter};
use crate::config::AdapterConfig;
use crate::models::sync_job::SyncSource;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("no adapter registered for source '{0}'")]
    MissingAdapter(SyncSource),
}

/// Registry holding one adapter per source.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<SyncSource, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build the production registry with one HTTP adapter per source.
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            SyncSource::Spotify,
            Arc::new(SpotifyAdapter::new(
                &config.spotify_api_base,
                config.spotify_token.clone(),
            )?),
        );
        registry.register(
            SyncSource::Genius,
            Arc::new(GeniusAdapter::new(
                &config.genius_api_base,
                config.genius_token.clone(),
            )?),
        );
        registry.register(
            SyncSource::Lastfm,
            Arc::new(LastfmAdapter::new(
                &config.lastfm_api_base,
                config.lastfm_api_key.clone(),
            )?),
        );
        Ok(registry)
    }

    /// Register (or replace) the adapter for a source.
    pub fn register(&mut self, source: SyncSource, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(source, adapter);
    }

    /// Look up the adapter for a source.
    pub fn get(&self, source: SyncSource) -> Result<Arc<dyn SourceAdapter>, RegistryError> {
        self.adapters
            .get(&source)
            .cloned()
            .ok_or(RegistryError::MissingAdapter(source))
    }
}
