//! Favorites API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use moviecache_core::sync::transform::DEFAULT_USER_RATING;
use moviecache_core::{EnrichmentReport, Movie};

use super::handlers::{api_error, cache_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddFavoriteRequest {
    pub movie_id: i64,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub poster_path: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub global_rating: f64,
    #[serde(default)]
    pub user_rating: Option<f64>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
}

impl From<AddFavoriteRequest> for Movie {
    fn from(req: AddFavoriteRequest) -> Self {
        Movie {
            movie_id: req.movie_id,
            original_title: req.original_title.unwrap_or_else(|| req.title.clone()),
            title: req.title,
            poster_path: req.poster_path,
            overview: req.overview,
            release_date: req.release_date,
            global_rating: req.global_rating,
            user_rating: req.user_rating.unwrap_or(DEFAULT_USER_RATING),
            backdrop_path: req.backdrop_path,
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddFavoriteResponse {
    pub id: i64,
    pub movie_id: i64,
}

#[derive(Debug, Serialize)]
pub struct RemoveFavoriteResponse {
    pub removed: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/favorites
pub async fn add_favorite(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddFavoriteRequest>,
) -> Result<(StatusCode, Json<AddFavoriteResponse>), ApiError> {
    if req.movie_id < 0 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "movie_id cannot be negative",
        ));
    }

    let movie_id = req.movie_id;
    let id = state
        .cache()
        .add_favorite(req.into())
        .await
        .map_err(cache_error)?;

    Ok((StatusCode::CREATED, Json(AddFavoriteResponse { id, movie_id })))
}

/// DELETE /api/v1/favorites/{id}
pub async fn remove_favorite(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
) -> Result<Json<RemoveFavoriteResponse>, ApiError> {
    let removed = state
        .cache()
        .remove_favorite(movie_id)
        .await
        .map_err(cache_error)?;

    if removed == 0 {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Movie {} is not a favorite", movie_id),
        ));
    }
    Ok(Json(RemoveFavoriteResponse { removed }))
}

/// POST /api/v1/favorites/{id}/enrich
///
/// Fetch trailer and review data for a favorite. Always answers 200; the
/// report says what happened to each part.
pub async fn enrich_favorite(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
) -> Json<EnrichmentReport> {
    Json(state.cache().enrich(movie_id).await)
}
