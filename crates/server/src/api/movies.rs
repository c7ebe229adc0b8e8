//! Movie listing handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use moviecache_core::{
    Movie, MovieColumn, MovieQuery, ResourcePath, RowSet, Selection, SortOrder,
};

use super::handlers::{api_error, cache_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct MovieQueryParams {
    /// Comma-separated column names.
    #[serde(default)]
    pub columns: Option<String>,
    /// Case-insensitive title substring.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    /// Column to sort by.
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub desc: bool,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub path: String,
    pub content_type: String,
    pub columns: Vec<MovieColumn>,
    pub movies: Vec<Movie>,
    pub total: usize,
}

impl MovieQueryParams {
    /// Build a typed query. Unknown column names are rejected.
    pub fn to_query(&self) -> Result<MovieQuery, String> {
        let mut query = MovieQuery::new();

        if let Some(columns) = &self.columns {
            let columns = columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| MovieColumn::parse(c).ok_or_else(|| format!("Unknown column: {}", c)))
                .collect::<Result<Vec<_>, _>>()?;
            query = query.with_projection(columns);
        }

        query = match (&self.title, self.min_rating) {
            (Some(_), Some(_)) => {
                return Err("Use either title or min_rating, not both".to_string())
            }
            (Some(title), None) => query.with_selection(Selection::TitleContains(title.clone())),
            (None, Some(rating)) => query.with_selection(Selection::MinRating(rating)),
            (None, None) => query,
        };

        if let Some(sort) = &self.sort {
            let column =
                MovieColumn::parse(sort).ok_or_else(|| format!("Unknown sort column: {}", sort))?;
            query = query.with_sort(if self.desc {
                SortOrder::desc(column)
            } else {
                SortOrder::asc(column)
            });
        }

        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }

        Ok(query)
    }
}

/// Fill the review placeholder into rows that were read with the reviews column.
fn render(rows: RowSet, placeholder: &str) -> (Vec<MovieColumn>, Vec<Movie>) {
    let columns = rows.columns().to_vec();
    let with_reviews = columns.contains(&MovieColumn::Reviews);

    let movies = rows
        .into_rows()
        .into_iter()
        .map(|mut movie| {
            if with_reviews && movie.reviews.is_none() {
                movie.reviews = Some(placeholder.to_string());
            }
            movie
        })
        .collect();

    (columns, movies)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/movies/{*path}
///
/// Read a collection (`popular`, `top_rated`, `favorites`) or a single
/// favorite (`favorites/{id}`).
pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(params): Query<MovieQueryParams>,
) -> Result<Json<MovieListResponse>, ApiError> {
    let path = ResourcePath::parse(&path).map_err(|e| cache_error(e.into()))?;
    let query = params
        .to_query()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let cache = state.cache();
    let rows = cache.query(path, query).await.map_err(cache_error)?;

    if matches!(path, ResourcePath::Favorite { .. }) && rows.is_empty() {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Movie not found: {}", path),
        ));
    }

    let (columns, movies) = render(rows, state.review_placeholder());
    let total = movies.len();
    Ok(Json(MovieListResponse {
        path: path.to_string(),
        content_type: cache.content_type(&path),
        columns,
        movies,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_build_query() {
        let params = MovieQueryParams {
            columns: Some("title, global_rating".to_string()),
            min_rating: Some(7.0),
            sort: Some("global_rating".to_string()),
            desc: true,
            limit: Some(5),
            ..Default::default()
        };

        let query = params.to_query().unwrap();
        assert_eq!(
            query.projection,
            Some(vec![MovieColumn::Title, MovieColumn::GlobalRating])
        );
        assert_eq!(query.selection, Some(Selection::MinRating(7.0)));
        assert_eq!(query.sort, Some(SortOrder::desc(MovieColumn::GlobalRating)));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_params_reject_unknown_column() {
        let params = MovieQueryParams {
            columns: Some("title,budget".to_string()),
            ..Default::default()
        };
        assert!(params.to_query().unwrap_err().contains("budget"));
    }

    #[test]
    fn test_params_reject_two_filters() {
        let params = MovieQueryParams {
            title: Some("club".to_string()),
            min_rating: Some(8.0),
            ..Default::default()
        };
        assert!(params.to_query().is_err());
    }

    #[test]
    fn test_render_fills_placeholder_only_when_read() {
        let movie = Movie {
            movie_id: 550,
            ..Default::default()
        };

        let rows = RowSet::new(MovieColumn::ALL.to_vec(), vec![movie.clone()]);
        let (_, movies) = render(rows, "No reviews yet.");
        assert_eq!(movies[0].reviews.as_deref(), Some("No reviews yet."));

        let rows = RowSet::new(vec![MovieColumn::MovieId, MovieColumn::Title], vec![movie]);
        let (_, movies) = render(rows, "No reviews yet.");
        assert!(movies[0].reviews.is_none());
    }
}
