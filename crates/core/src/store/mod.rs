//! Movie store - the durable, schema-versioned home of all three collections.
//!
//! Every mutation is a single transaction; readers never see one half-applied.

mod sqlite;
mod types;

pub use sqlite::{SqliteMovieStore, SCHEMA_VERSION};
pub use types::*;

use std::sync::Arc;

/// Trait for movie storage backends.
pub trait MovieStore: Send + Sync {
    /// Create the managed tables if they do not exist. Idempotent.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Bring the on-disk schema to `version`.
    ///
    /// On any mismatch all managed tables are dropped and recreated. Cached
    /// rows, favorites included, are lost. Returns true if tables were recreated.
    fn migrate(&self, version: u32) -> Result<bool, StoreError>;

    /// The schema version recorded on disk.
    fn schema_version(&self) -> Result<u32, StoreError>;

    /// Read rows from a collection.
    fn query(&self, collection: Collection, query: &MovieQuery) -> Result<RowSet, StoreError>;

    /// Number of rows in a collection.
    fn count(&self, collection: Collection) -> Result<usize, StoreError>;

    /// Get one row by movie id.
    fn get(&self, collection: Collection, movie_id: i64) -> Result<Option<Movie>, StoreError>;

    /// Atomically swap the contents of a collection for `rows`.
    ///
    /// Rows whose movie id repeats within the batch are skipped and counted.
    /// Any other failure rolls back, leaving the previous rows intact.
    fn bulk_replace(
        &self,
        collection: Collection,
        rows: &[Movie],
    ) -> Result<ReplaceOutcome, StoreError>;

    /// Add a movie to favorites. Returns the new row id.
    ///
    /// Fails with [`StoreError::Conflict`] if the movie is already a favorite.
    fn insert_favorite(&self, movie: &Movie) -> Result<i64, StoreError>;

    /// Remove a movie from favorites. Returns the number of rows removed.
    fn delete_favorite(&self, movie_id: i64) -> Result<usize, StoreError>;

    /// Update the patchable fields of one row. Returns the number of rows updated.
    fn patch_by_id(
        &self,
        collection: Collection,
        movie_id: i64,
        patch: &MoviePatch,
    ) -> Result<usize, StoreError>;
}

/// Run a store call on the blocking pool so async callers never wait on disk.
pub async fn run_blocking<T, F>(store: &Arc<dyn MovieStore>, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MovieStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Internal(format!("Store task failed: {}", e)))?
}
