//! Remote movie catalog client.
//!
//! Sync reads sorted listings from the catalog; enrichment reads trailers
//! and reviews for a single movie.

mod tmdb;
mod types;
pub mod youtube;

pub use tmdb::{TmdbCatalogClient, TmdbConfig};
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the catalog.
#[derive(Debug, Error)]
pub enum CatalogClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request did not finish within its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimitExceeded,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Client not configured (missing API key, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

/// Trait for catalog clients.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch one page of a sorted listing.
    async fn fetch_collection(
        &self,
        request: &CollectionRequest,
    ) -> Result<Vec<CatalogMovie>, CatalogClientError>;

    /// Fetch the trailers for a movie.
    async fn fetch_trailers(&self, movie_id: i64) -> Result<Vec<TrailerRef>, CatalogClientError>;

    /// Fetch the reviews for a movie.
    async fn fetch_reviews(&self, movie_id: i64) -> Result<Vec<ReviewRef>, CatalogClientError>;
}
