//! Testing utilities and mock implementations.
//!
//! This module provides a mock catalog client and fixtures, allowing the
//! engine and the server to be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use moviecache_core::testing::{fixtures, MockCatalogClient};
//!
//! let client = MockCatalogClient::new();
//! client.set_collection(SortKey::Popular, vec![fixtures::catalog_movie(10, "Heat")]).await;
//! client.add_trailer(10, fixtures::trailer("SUXWAEX2jlg")).await;
//! ```

mod mock_catalog_client;

pub use mock_catalog_client::{MockCatalogClient, RecordedCatalogCall};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::catalog::{youtube, CatalogMovie, ReviewRef, TrailerRef};
    use crate::store::{Movie, MovieStore, SqliteMovieStore, StoreError};
    use crate::sync::transform::DEFAULT_USER_RATING;

    /// Create a catalog record with reasonable defaults.
    pub fn catalog_movie(id: i64, title: &str) -> CatalogMovie {
        CatalogMovie {
            id,
            title: title.to_string(),
            original_title: title.to_string(),
            poster_url: format!("https://image.tmdb.org/t/p/w342/{}.jpg", id),
            overview: format!("A movie about {}.", title.to_lowercase()),
            release_date: "1999-10-15".to_string(),
            vote_average: 7.5,
            backdrop_url: None,
        }
    }

    /// Create a stored row with reasonable defaults.
    pub fn movie(id: i64, title: &str) -> Movie {
        Movie {
            movie_id: id,
            title: title.to_string(),
            original_title: title.to_string(),
            poster_path: format!("https://image.tmdb.org/t/p/w342/{}.jpg", id),
            overview: format!("A movie about {}.", title.to_lowercase()),
            release_date: "1999-10-15".to_string(),
            global_rating: 7.5,
            user_rating: DEFAULT_USER_RATING,
            ..Default::default()
        }
    }

    /// Create a YouTube trailer reference.
    pub fn trailer(key: &str) -> TrailerRef {
        TrailerRef {
            name: "Official Trailer".to_string(),
            url: youtube::watch_url(key),
        }
    }

    pub fn review(author: &str, content: &str) -> ReviewRef {
        ReviewRef {
            author: author.to_string(),
            content: content.to_string(),
        }
    }

    /// An empty in-memory store at the current schema version.
    pub fn in_memory_store() -> Result<Arc<dyn MovieStore>, StoreError> {
        Ok(Arc::new(SqliteMovieStore::in_memory()?))
    }
}
