//! Mock catalog client for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::{
    CatalogClient, CatalogClientError, CatalogMovie, CollectionRequest, ReviewRef, SortKey,
    TrailerRef,
};

/// A recorded catalog call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCatalogCall {
    FetchCollection(CollectionRequest),
    FetchTrailers { movie_id: i64 },
    FetchReviews { movie_id: i64 },
}

/// Mock implementation of the CatalogClient trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable listings, trailers and reviews
/// - Track calls for assertions
/// - Simulate failures and slow responses
///
/// # Example
///
/// ```rust,ignore
/// use moviecache_core::testing::{fixtures, MockCatalogClient};
///
/// let client = MockCatalogClient::new();
/// client
///     .set_collection(SortKey::Popular, vec![fixtures::catalog_movie(10, "Heat")])
///     .await;
///
/// let movies = client.fetch_collection(&CollectionRequest::new(SortKey::Popular)).await?;
/// assert_eq!(movies.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockCatalogClient {
    /// Listings by sort key.
    collections: Arc<RwLock<HashMap<SortKey, Vec<CatalogMovie>>>>,
    /// Trailers by movie id.
    trailers: Arc<RwLock<HashMap<i64, Vec<TrailerRef>>>>,
    /// Reviews by movie id.
    reviews: Arc<RwLock<HashMap<i64, Vec<ReviewRef>>>>,
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedCatalogCall>>>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<CatalogClientError>>>,
    /// Delay applied to every call.
    delay: Arc<RwLock<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockCatalogClient {
    /// Create a new empty mock client.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Data Configuration
    // =========================================================================

    /// Set the listing returned for a sort key.
    pub async fn set_collection(&self, sort_key: SortKey, movies: Vec<CatalogMovie>) {
        self.collections.write().await.insert(sort_key, movies);
    }

    /// Add a trailer for a movie.
    pub async fn add_trailer(&self, movie_id: i64, trailer: TrailerRef) {
        self.trailers
            .write()
            .await
            .entry(movie_id)
            .or_default()
            .push(trailer);
    }

    /// Add a review for a movie.
    pub async fn add_review(&self, movie_id: i64, review: ReviewRef) {
        self.reviews
            .write()
            .await
            .entry(movie_id)
            .or_default()
            .push(review);
    }

    // =========================================================================
    // Call Recording
    // =========================================================================

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCatalogCall> {
        self.calls.read().await.clone()
    }

    /// Get the number of calls performed.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Highest number of calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: CatalogClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Delay every call by `delay`, or remove the delay.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    async fn begin(&self, call: RecordedCatalogCall) -> Result<InFlight, CatalogClientError> {
        self.calls.write().await.push(call);

        let guard = InFlight::enter(&self.in_flight, &self.peak_in_flight);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(guard),
        }
    }
}

/// Tracks concurrently running calls; leaves on drop so cancelled calls are counted out.
struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogClient for MockCatalogClient {
    async fn fetch_collection(
        &self,
        request: &CollectionRequest,
    ) -> Result<Vec<CatalogMovie>, CatalogClientError> {
        let _in_flight = self
            .begin(RecordedCatalogCall::FetchCollection(request.clone()))
            .await?;

        Ok(self
            .collections
            .read()
            .await
            .get(&request.sort_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_trailers(&self, movie_id: i64) -> Result<Vec<TrailerRef>, CatalogClientError> {
        let _in_flight = self
            .begin(RecordedCatalogCall::FetchTrailers { movie_id })
            .await?;

        Ok(self
            .trailers
            .read()
            .await
            .get(&movie_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_reviews(&self, movie_id: i64) -> Result<Vec<ReviewRef>, CatalogClientError> {
        let _in_flight = self
            .begin(RecordedCatalogCall::FetchReviews { movie_id })
            .await?;

        Ok(self
            .reviews
            .read()
            .await
            .get(&movie_id)
            .cloned()
            .unwrap_or_default())
    }
}
