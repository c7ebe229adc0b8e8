//! Catalog records to stored rows.

use crate::catalog::CatalogMovie;
use crate::store::Movie;

/// User rating given to every synced row.
pub const DEFAULT_USER_RATING: f64 = 5.0;

/// Copy a catalog record into a row. Enrichment fields start empty.
pub fn to_movie(record: CatalogMovie) -> Movie {
    Movie {
        movie_id: record.id,
        title: record.title,
        original_title: record.original_title,
        poster_path: record.poster_url,
        overview: record.overview,
        release_date: record.release_date,
        global_rating: record.vote_average,
        user_rating: DEFAULT_USER_RATING,
        trailer_path: None,
        trailer_thumbnail_path: None,
        backdrop_path: record.backdrop_url,
        reviews: None,
    }
}

pub fn to_rows(records: Vec<CatalogMovie>) -> Vec<Movie> {
    records.into_iter().map(to_movie).collect()
}
