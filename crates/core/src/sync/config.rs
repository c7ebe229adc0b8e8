//! Sync configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::SortKey;

/// Configuration for the sync coordinator. This is the `[sync]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Refresh the default sort mode when the process starts.
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,

    /// Sort mode active before any explicit selection.
    #[serde(default = "default_sort_mode")]
    pub default_sort_mode: SortKey,

    /// Listing language sent with every collection request.
    #[serde(default = "default_language")]
    pub language: String,

    /// Listing page. Only a single page is ever mirrored.
    #[serde(default = "default_page")]
    pub page: u32,

    /// Deadline for one remote fetch, in seconds.
    /// Applies to collection, trailer and review fetches.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_sync_on_start() -> bool {
    true
}

fn default_sort_mode() -> SortKey {
    SortKey::Popular
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_page() -> u32 {
    1
}

fn default_fetch_timeout() -> u64 {
    15
}

impl SyncConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_on_start: default_sync_on_start(),
            default_sort_mode: default_sort_mode(),
            language: default_language(),
            page: default_page(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}
