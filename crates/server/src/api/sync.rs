//! Sync API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use moviecache_core::{SortKey, SyncReport, SyncStatus};

use super::handlers::{api_error, cache_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// Absent when the cycle failed and the previous rows were kept.
    pub report: Option<SyncReport>,
    pub status: SyncStatus,
}

#[derive(Debug, Serialize)]
pub struct SortModeResponse {
    pub active_sort_mode: SortKey,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub active_sort_mode: SortKey,
    pub collections: Vec<SyncStatus>,
}

fn parse_sort_key(raw: &str) -> Result<SortKey, ApiError> {
    raw.parse::<SortKey>()
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/sync/{sort_key}
///
/// Run one refresh cycle and wait for it.
pub async fn run_sync(
    State(state): State<Arc<AppState>>,
    Path(sort_key): Path<String>,
) -> Result<Json<SyncResponse>, ApiError> {
    let sort_key = parse_sort_key(&sort_key)?;
    let cache = state.cache();

    let report = cache.sync(sort_key).await.map_err(cache_error)?;
    Ok(Json(SyncResponse {
        report,
        status: cache.status(sort_key),
    }))
}

/// PUT /api/v1/sort-mode/{sort_key}
///
/// Switch the active sort mode. The refresh runs in the background.
pub async fn select_sort_mode(
    State(state): State<Arc<AppState>>,
    Path(sort_key): Path<String>,
) -> Result<(StatusCode, Json<SortModeResponse>), ApiError> {
    let sort_key = parse_sort_key(&sort_key)?;
    state.cache().select_sort_mode(sort_key);

    Ok((
        StatusCode::ACCEPTED,
        Json(SortModeResponse {
            active_sort_mode: sort_key,
        }),
    ))
}

/// GET /api/v1/sync/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SyncStatusResponse> {
    let cache = state.cache();
    Json(SyncStatusResponse {
        active_sort_mode: cache.active_sort_mode(),
        collections: SortKey::ALL.iter().map(|key| cache.status(*key)).collect(),
    })
}
