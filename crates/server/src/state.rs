use moviecache_core::{Config, MovieCache, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    cache: MovieCache,
}

impl AppState {
    pub fn new(config: Config, cache: MovieCache) -> Self {
        Self { config, cache }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn cache(&self) -> &MovieCache {
        &self.cache
    }

    /// Text rendered in place of reviews that have not been fetched yet.
    pub fn review_placeholder(&self) -> &str {
        &self.config.enrichment.review_placeholder
    }
}
