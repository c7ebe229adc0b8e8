pub mod catalog;
pub mod config;
pub mod engine;
pub mod enrichment;
pub mod metrics;
pub mod notifier;
pub mod router;
pub mod store;
pub mod sync;
pub mod testing;

pub use catalog::{
    CatalogClient, CatalogClientError, CatalogMovie, CollectionRequest, ReviewRef, SortKey,
    TmdbCatalogClient, TmdbConfig, TrailerRef,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig,
};
pub use engine::{CacheError, MovieCache};
pub use enrichment::{EnrichmentHandle, EnrichmentKind, EnrichmentOutcome, EnrichmentReport, Enricher};
pub use notifier::{ChangeEvent, ChangeKind, ChangeNotifier, Subscription, SubscriptionHandle};
pub use router::{resolve, route, ResourcePath, Route, RouteError};
pub use store::{
    Collection, Movie, MovieColumn, MoviePatch, MovieQuery, MovieStore, ReplaceOutcome, RowSet,
    Selection, SortOrder, SqliteMovieStore, StoreError, SCHEMA_VERSION,
};
pub use sync::{
    RefreshHandle, SyncConfig, SyncCoordinator, SyncError, SyncPhase, SyncReport, SyncStatus,
};
