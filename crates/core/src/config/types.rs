use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::catalog::TmdbConfig;
use crate::store::SCHEMA_VERSION;
use crate::sync::SyncConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: TmdbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Expected schema version. A different version on disk recreates every table.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            schema_version: default_schema_version(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("moviecache.db")
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Enrichment configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    /// Shown in place of reviews until review enrichment has run.
    #[serde(default = "default_review_placeholder")]
    pub review_placeholder: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            review_placeholder: default_review_placeholder(),
        }
    }
}

fn default_review_placeholder() -> String {
    "No reviews yet.".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub catalog: SanitizedCatalogConfig,
    pub sync: SyncConfig,
    pub enrichment: EnrichmentConfig,
    pub logging: LoggingConfig,
}

/// Sanitized catalog config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCatalogConfig {
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_size: Option<String>,
    pub request_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            catalog: SanitizedCatalogConfig {
                api_key_configured: !config.catalog.api_key.is_empty(),
                base_url: config.catalog.base_url.clone(),
                image_base_url: config.catalog.image_base_url.clone(),
                poster_size: config.catalog.poster_size.clone(),
                request_timeout_secs: config.catalog.request_timeout_secs,
            },
            sync: config.sync.clone(),
            enrichment: config.enrichment.clone(),
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SortKey;

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
path = "/data/movies.db"

[catalog]
api_key = "secret"
poster_size = "w500"

[sync]
sync_on_start = false
default_sort_mode = "top_rated"

[enrichment]
review_placeholder = "Nothing here"

[logging]
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.database.path.to_str().unwrap(), "/data/movies.db");
        assert_eq!(config.database.schema_version, SCHEMA_VERSION);
        assert_eq!(config.catalog.api_key, "secret");
        assert_eq!(config.catalog.poster_size.as_deref(), Some("w500"));
        assert!(!config.sync.sync_on_start);
        assert_eq!(config.sync.default_sort_mode, SortKey::TopRated);
        assert_eq!(config.enrichment.review_placeholder, "Nothing here");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "moviecache.db");
        assert_eq!(config.catalog.request_timeout_secs, 10);
        assert!(config.sync.sync_on_start);
        assert_eq!(config.enrichment.review_placeholder, "No reviews yet.");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_unknown_sort_mode_fails() {
        let toml = r#"
[sync]
default_sort_mode = "favorites"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_api_key() {
        let mut config = Config::default();
        config.catalog.api_key = "super-secret".to_string();

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.catalog.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
