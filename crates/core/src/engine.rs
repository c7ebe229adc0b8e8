//! The movie cache facade.
//!
//! Ties the store, router, notifier, sync coordinator and enricher together.
//! This is the surface observers and the favoriting UI talk to.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::{CatalogClient, SortKey};
use crate::enrichment::{EnrichmentHandle, EnrichmentReport, Enricher};
use crate::notifier::{
    ChangeEvent, ChangeKind, ChangeNotifier, Subscription, SubscriptionHandle,
};
use crate::router::{route, ResourcePath, RouteError};
use crate::store::{
    run_blocking, Collection, Movie, MovieQuery, MovieStore, RowSet, Selection, StoreError,
};
use crate::sync::{RefreshHandle, SyncConfig, SyncCoordinator, SyncError, SyncReport, SyncStatus};

/// Errors surfaced to callers of the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The resource path is not routable. A caller bug; never retried.
    #[error(transparent)]
    UnsupportedResource(#[from] RouteError),

    /// The movie is already a favorite.
    #[error("Movie {0} is already a favorite")]
    Conflict(i64),

    /// Storage failed.
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for CacheError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { movie_id, .. } => CacheError::Conflict(movie_id),
            other => CacheError::Storage(other),
        }
    }
}

/// The movie cache engine.
pub struct MovieCache {
    store: Arc<dyn MovieStore>,
    notifier: ChangeNotifier,
    coordinator: SyncCoordinator,
    enricher: Enricher,
}

impl MovieCache {
    /// Create a cache over an opened store.
    pub fn new(
        store: Arc<dyn MovieStore>,
        client: Arc<dyn CatalogClient>,
        config: SyncConfig,
    ) -> Self {
        let notifier = ChangeNotifier::new();
        let enricher = Enricher::new(
            Arc::clone(&store),
            Arc::clone(&client),
            notifier.clone(),
            config.fetch_timeout(),
        );
        let coordinator = SyncCoordinator::new(Arc::clone(&store), client, notifier.clone(), config);

        Self {
            store,
            notifier,
            coordinator,
            enricher,
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Read a snapshot of the rows under `path`.
    ///
    /// For an item path the selection is replaced by that item's movie id.
    pub async fn query(&self, path: ResourcePath, query: MovieQuery) -> Result<RowSet, CacheError> {
        let target = route(&path);
        let query = match target.movie_id {
            Some(movie_id) => query.with_selection(Selection::MovieId(movie_id)),
            None => query,
        };

        let rows = run_blocking(&self.store, move |store| {
            store.query(target.collection, &query)
        })
        .await?;
        Ok(rows)
    }

    /// Parse a raw path and read it.
    pub async fn query_path(&self, path: &str, query: MovieQuery) -> Result<RowSet, CacheError> {
        let path = ResourcePath::parse(path)?;
        self.query(path, query).await
    }

    /// Content-type tag of a path.
    pub fn content_type(&self, path: &ResourcePath) -> String {
        route(path).content_type()
    }

    /// Subscribe to changes under `path`. Dropping the subscription ends it.
    pub fn subscribe(&self, path: ResourcePath) -> Subscription {
        self.notifier.subscribe(path)
    }

    /// Subscribe with a callback. Must be called within a Tokio runtime.
    pub fn subscribe_with<F>(&self, path: ResourcePath, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        self.notifier.subscribe_with(path, callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.notifier.unsubscribe(handle)
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    /// Add a movie to favorites. Returns the new row id.
    pub async fn add_favorite(&self, movie: Movie) -> Result<i64, CacheError> {
        let movie_id = movie.movie_id;
        let row_id = run_blocking(&self.store, move |store| store.insert_favorite(&movie)).await?;

        info!("Added movie {} to favorites", movie_id);
        self.notifier
            .emit(ResourcePath::Favorite { movie_id }, ChangeKind::Inserted);
        Ok(row_id)
    }

    /// Remove a movie from favorites. Returns how many rows were removed.
    pub async fn remove_favorite(&self, movie_id: i64) -> Result<usize, CacheError> {
        let removed = run_blocking(&self.store, move |store| store.delete_favorite(movie_id)).await?;

        if removed > 0 {
            info!("Removed movie {} from favorites", movie_id);
            self.notifier
                .emit(ResourcePath::Favorite { movie_id }, ChangeKind::Deleted);
        }
        Ok(removed)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Refresh a collection now.
    ///
    /// Returns `None` when the cycle failed in a way that keeps the previous
    /// rows (network, parse, timeout, cancellation); see [`MovieCache::status`].
    pub async fn sync(&self, sort_key: SortKey) -> Result<Option<SyncReport>, CacheError> {
        let token = CancellationToken::new();
        match self.coordinator.sync(sort_key, &token).await {
            Ok(report) => Ok(Some(report)),
            Err(e) => surface(e).map(|_| None),
        }
    }

    /// Refresh a collection on a background task.
    pub fn spawn_refresh(&self, sort_key: SortKey) -> RefreshHandle {
        self.coordinator.spawn_refresh(sort_key)
    }

    /// Switch the active sort mode and refresh it.
    pub fn select_sort_mode(&self, sort_key: SortKey) -> RefreshHandle {
        self.coordinator.select_sort_mode(sort_key)
    }

    pub fn active_sort_mode(&self) -> SortKey {
        self.coordinator.active_sort_mode()
    }

    pub fn status(&self, sort_key: SortKey) -> SyncStatus {
        self.coordinator.status(sort_key)
    }

    pub fn watch_status(&self, sort_key: SortKey) -> watch::Receiver<SyncStatus> {
        self.coordinator.watch_status(sort_key)
    }

    // =========================================================================
    // Enrichment
    // =========================================================================

    /// Enrich a favorite with trailer and review data.
    pub async fn enrich(&self, movie_id: i64) -> EnrichmentReport {
        self.enricher.enrich(movie_id, &CancellationToken::new()).await
    }

    pub fn spawn_enrichment(&self, movie_id: i64) -> EnrichmentHandle {
        self.enricher.spawn_enrichment(movie_id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Row count of a collection.
    pub async fn count(&self, collection: Collection) -> Result<usize, CacheError> {
        Ok(run_blocking(&self.store, move |store| store.count(collection)).await?)
    }

    /// Stop all background sync and enrichment work.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.enricher.shutdown();
    }
}

/// Map a sync failure onto what the caller is allowed to see.
fn surface(e: SyncError) -> Result<(), CacheError> {
    match e {
        e if e.is_contained() => Ok(()),
        SyncError::Storage(e) => Err(CacheError::from(e)),
        other => Err(CacheError::Storage(StoreError::Internal(other.to_string()))),
    }
}
