//! Types for the sync coordinator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogClientError, SortKey};
use crate::store::StoreError;

/// Errors that can end a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote fetch failed (network, HTTP status or parse).
    #[error("fetch failed: {0}")]
    Fetch(#[from] CatalogClientError),

    /// Remote fetch exceeded its deadline.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The cycle was cancelled before it touched storage.
    #[error("sync cancelled")]
    Cancelled,

    /// Storage failed; the previous snapshot is intact.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The background task running the cycle died.
    #[error("sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// True for failures that stay inside the engine.
    ///
    /// Only storage failures reach the caller; the rest keep the prior
    /// snapshot and are reported through [`SyncStatus`].
    pub fn is_contained(&self) -> bool {
        !matches!(self, SyncError::Storage(_) | SyncError::Task(_))
    }

    /// Metric label for this failure.
    pub fn result_label(&self) -> &'static str {
        match self {
            SyncError::Cancelled => "cancelled",
            _ => "failed",
        }
    }
}

/// Where a collection is in its refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Transforming,
    Replacing,
    Notifying,
    Failed,
}

/// Observable sync state of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub sort_key: SortKey,
    pub phase: SyncPhase,
    /// A cycle is running or waiting for the collection lock.
    pub in_flight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Rows written by the last successful cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_row_count: Option<usize>,
}

impl SyncStatus {
    pub fn new(sort_key: SortKey) -> Self {
        Self {
            sort_key,
            phase: SyncPhase::Idle,
            in_flight: false,
            last_success_at: None,
            last_error: None,
            last_row_count: None,
        }
    }
}

/// Summary of a completed sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub sort_key: SortKey,
    /// Records returned by the catalog.
    pub fetched: usize,
    /// Rows now in the collection.
    pub inserted: usize,
    /// Records dropped as duplicate movie ids.
    pub skipped: usize,
    pub duration_ms: u64,
}
