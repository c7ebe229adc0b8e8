//! Types for the movie store.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named partition of cached movie rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Mirror of the remote "popular" listing. Owned by sync.
    Popular,
    /// Mirror of the remote "top rated" listing. Owned by sync.
    TopRated,
    /// User-curated favorites. Owned by explicit add/remove.
    Favorites,
}

impl Collection {
    /// All managed collections, in table creation order.
    pub const ALL: [Collection; 3] = [
        Collection::Favorites,
        Collection::TopRated,
        Collection::Popular,
    ];

    /// Table name (also the resource path segment).
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Popular => "popular",
            Collection::TopRated => "top_rated",
            Collection::Favorites => "favorites",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A cached movie row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Movie {
    /// Remote-assigned movie id, unique within a collection.
    pub movie_id: i64,
    pub title: String,
    pub original_title: String,
    /// Absolute poster URL.
    pub poster_path: String,
    pub overview: String,
    /// Release date (YYYY-MM-DD).
    pub release_date: String,
    /// Average vote from the remote catalog (0-10).
    pub global_rating: f64,
    pub user_rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailer_thumbnail_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    /// First review text, once review enrichment has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<String>,
}

impl Movie {
    /// Review text, or `placeholder` if the row has not been enriched yet.
    pub fn reviews_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.reviews.as_deref().unwrap_or(placeholder)
    }
}

/// The only fields enrichment is allowed to change.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoviePatch {
    pub trailer_path: Option<String>,
    pub trailer_thumbnail_path: Option<String>,
    pub reviews: Option<String>,
}

impl MoviePatch {
    pub fn trailer(path: impl Into<String>, thumbnail: Option<String>) -> Self {
        Self {
            trailer_path: Some(path.into()),
            trailer_thumbnail_path: thumbnail,
            reviews: None,
        }
    }

    pub fn reviews(text: impl Into<String>) -> Self {
        Self {
            reviews: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trailer_path.is_none()
            && self.trailer_thumbnail_path.is_none()
            && self.reviews.is_none()
    }
}

/// A column of the movie table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovieColumn {
    MovieId,
    Title,
    OriginalTitle,
    PosterPath,
    Overview,
    ReleaseDate,
    GlobalRating,
    UserRating,
    TrailerPath,
    TrailerThumbnailPath,
    BackdropPath,
    Reviews,
}

impl MovieColumn {
    pub const ALL: [MovieColumn; 12] = [
        MovieColumn::MovieId,
        MovieColumn::Title,
        MovieColumn::OriginalTitle,
        MovieColumn::PosterPath,
        MovieColumn::Overview,
        MovieColumn::ReleaseDate,
        MovieColumn::GlobalRating,
        MovieColumn::UserRating,
        MovieColumn::TrailerPath,
        MovieColumn::TrailerThumbnailPath,
        MovieColumn::BackdropPath,
        MovieColumn::Reviews,
    ];

    /// SQL column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovieColumn::MovieId => "movie_id",
            MovieColumn::Title => "title",
            MovieColumn::OriginalTitle => "original_title",
            MovieColumn::PosterPath => "poster_path",
            MovieColumn::Overview => "overview",
            MovieColumn::ReleaseDate => "release_date",
            MovieColumn::GlobalRating => "global_rating",
            MovieColumn::UserRating => "user_rating",
            MovieColumn::TrailerPath => "trailer_path",
            MovieColumn::TrailerThumbnailPath => "trailer_thumbnail_path",
            MovieColumn::BackdropPath => "backdrop_path",
            MovieColumn::Reviews => "reviews",
        }
    }

    /// Parse a SQL column name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// Row filter for [`MovieQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Exact movie id.
    MovieId(i64),
    /// Case-insensitive substring match on the title.
    TitleContains(String),
    /// Global rating greater than or equal to the value.
    MinRating(f64),
}

/// Result ordering for [`MovieQuery`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortOrder {
    pub column: MovieColumn,
    pub descending: bool,
}

impl SortOrder {
    pub fn asc(column: MovieColumn) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: MovieColumn) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Read-only query against one collection.
///
/// Rows come back in insertion order unless a sort order is given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieQuery {
    /// Columns to read. `None` reads every column. `movie_id` is always read.
    pub projection: Option<Vec<MovieColumn>>,
    pub selection: Option<Selection>,
    pub sort: Option<SortOrder>,
    pub limit: Option<u32>,
}

impl MovieQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, columns: impl Into<Vec<MovieColumn>>) -> Self {
        self.projection = Some(columns.into());
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The columns this query reads, `movie_id` first.
    pub fn columns(&self) -> Vec<MovieColumn> {
        match &self.projection {
            None => MovieColumn::ALL.to_vec(),
            Some(projection) => {
                let mut columns = vec![MovieColumn::MovieId];
                for column in projection {
                    if !columns.contains(column) {
                        columns.push(*column);
                    }
                }
                columns
            }
        }
    }
}

/// Immutable snapshot of the rows a query matched.
///
/// Columns outside the projection carry their empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    columns: Vec<MovieColumn>,
    rows: Vec<Movie>,
}

impl RowSet {
    pub fn new(columns: Vec<MovieColumn>, rows: Vec<Movie>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[MovieColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Movie] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Movie> {
        self.rows.iter()
    }

    pub fn movie_ids(&self) -> Vec<i64> {
        self.rows.iter().map(|m| m.movie_id).collect()
    }

    pub fn into_rows(self) -> Vec<Movie> {
        self.rows
    }
}

impl IntoIterator for RowSet {
    type Item = Movie;
    type IntoIter = std::vec::IntoIter<Movie>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Movie;
    type IntoIter = std::slice::Iter<'a, Movie>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Result of a bulk replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    /// Rows written.
    pub inserted: usize,
    /// Rows dropped because their movie id was already in the batch.
    pub skipped: usize,
}

/// Errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Movie {movie_id} already exists in {collection}")]
    Conflict { collection: Collection, movie_id: i64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_table_names() {
        assert_eq!(Collection::Popular.table_name(), "popular");
        assert_eq!(Collection::TopRated.table_name(), "top_rated");
        assert_eq!(Collection::Favorites.to_string(), "favorites");
    }

    #[test]
    fn test_collection_serialization() {
        assert_eq!(
            serde_json::to_string(&Collection::TopRated).unwrap(),
            "\"top_rated\""
        );
    }

    #[test]
    fn test_column_parse_round_trips_names() {
        assert_eq!(MovieColumn::parse("title"), Some(MovieColumn::Title));
        assert_eq!(
            MovieColumn::parse("trailer_thumbnail_path"),
            Some(MovieColumn::TrailerThumbnailPath)
        );
        assert_eq!(MovieColumn::parse("title; DROP TABLE popular"), None);
    }

    #[test]
    fn test_query_columns_always_include_movie_id() {
        let query = MovieQuery::new().with_projection(vec![MovieColumn::Title, MovieColumn::Title]);
        assert_eq!(
            query.columns(),
            vec![MovieColumn::MovieId, MovieColumn::Title]
        );

        assert_eq!(MovieQuery::new().columns().len(), MovieColumn::ALL.len());
    }

    #[test]
    fn test_reviews_placeholder() {
        let mut movie = Movie::default();
        assert_eq!(movie.reviews_or("No reviews yet."), "No reviews yet.");

        movie.reviews = Some("Great.".to_string());
        assert_eq!(movie.reviews_or("No reviews yet."), "Great.");
    }

    #[test]
    fn test_patch_constructors() {
        assert!(MoviePatch::default().is_empty());

        let patch = MoviePatch::trailer("https://www.youtube.com/watch?v=abc", None);
        assert!(!patch.is_empty());
        assert!(patch.reviews.is_none());

        let patch = MoviePatch::reviews("Fine film");
        assert!(patch.trailer_path.is_none());
        assert_eq!(patch.reviews.as_deref(), Some("Fine film"));
    }

    #[test]
    fn test_movie_serialization_skips_missing_enrichment() {
        let movie = Movie {
            movie_id: 550,
            title: "Fight Club".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&movie).unwrap();
        assert!(!json.contains("trailer_path"));
        assert!(!json.contains("reviews"));
    }
}
