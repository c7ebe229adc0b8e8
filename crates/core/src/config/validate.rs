use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - A TMDB API key is present
/// - Timeouts and page are not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Catalog validation
    if config.catalog.api_key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "catalog.api_key is required".to_string(),
        ));
    }
    if config.catalog.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "catalog.request_timeout_secs cannot be 0".to_string(),
        ));
    }

    // Sync validation
    if config.sync.page == 0 {
        return Err(ConfigError::ValidationError(
            "sync.page starts at 1".to_string(),
        ));
    }
    if config.sync.fetch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "sync.fetch_timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
