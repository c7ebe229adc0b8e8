//! Trailer and review patchers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{youtube, CatalogClient, CatalogClientError};
use crate::metrics::ENRICHMENT_RUNS;
use crate::notifier::{ChangeKind, ChangeNotifier};
use crate::router::ResourcePath;
use crate::store::{run_blocking, Collection, MoviePatch, MovieStore};

use super::{EnrichmentKind, EnrichmentOutcome, EnrichmentReport};

/// The only collection enrichment writes to.
const TARGET: Collection = Collection::Favorites;

/// Fetches trailer and review data and patches it into favorites.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn MovieStore>,
    client: Arc<dyn CatalogClient>,
    notifier: ChangeNotifier,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn MovieStore>,
        client: Arc<dyn CatalogClient>,
        notifier: ChangeNotifier,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Patch the first trailer and its thumbnail into the favorite row.
    pub async fn enrich_trailer(
        &self,
        movie_id: i64,
        token: &CancellationToken,
    ) -> EnrichmentOutcome {
        let outcome = match self.fetch(token, self.client.fetch_trailers(movie_id)).await {
            Ok(trailers) => match trailers.into_iter().next() {
                Some(trailer) => {
                    let thumbnail = youtube::thumbnail_url(&trailer.url);
                    if thumbnail.is_none() {
                        debug!("No thumbnail for trailer {}", trailer.url);
                    }
                    self.apply(movie_id, MoviePatch::trailer(trailer.url, thumbnail), token)
                        .await
                }
                None => EnrichmentOutcome::NoResults,
            },
            Err(outcome) => outcome,
        };

        self.record(EnrichmentKind::Trailer, movie_id, &outcome);
        outcome
    }

    /// Patch the first review text into the favorite row.
    pub async fn enrich_reviews(
        &self,
        movie_id: i64,
        token: &CancellationToken,
    ) -> EnrichmentOutcome {
        let outcome = match self.fetch(token, self.client.fetch_reviews(movie_id)).await {
            Ok(reviews) => match reviews.into_iter().next() {
                Some(review) => {
                    self.apply(movie_id, MoviePatch::reviews(review.content), token)
                        .await
                }
                None => EnrichmentOutcome::NoResults,
            },
            Err(outcome) => outcome,
        };

        self.record(EnrichmentKind::Reviews, movie_id, &outcome);
        outcome
    }

    /// Run both enrichments concurrently.
    pub async fn enrich(&self, movie_id: i64, token: &CancellationToken) -> EnrichmentReport {
        let (trailer, reviews) = futures::join!(
            self.enrich_trailer(movie_id, token),
            self.enrich_reviews(movie_id, token)
        );

        EnrichmentReport {
            movie_id,
            trailer,
            reviews,
        }
    }

    /// Run both enrichments on a background task.
    pub fn spawn_enrichment(&self, movie_id: i64) -> EnrichmentHandle {
        let token = self.shutdown.child_token();
        let enricher = self.clone();
        let task_token = token.clone();

        let task = tokio::spawn(async move { enricher.enrich(movie_id, &task_token).await });

        EnrichmentHandle {
            movie_id,
            token,
            task,
        }
    }

    /// Cancel every enrichment started through [`Enricher::spawn_enrichment`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn fetch<T, F>(&self, token: &CancellationToken, request: F) -> Result<T, EnrichmentOutcome>
    where
        F: Future<Output = Result<T, CatalogClientError>>,
    {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(EnrichmentOutcome::Cancelled),
            result = tokio::time::timeout(self.timeout, request) => result,
        };

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Enrichment fetch failed: {}", e);
                Err(EnrichmentOutcome::Failed(e.to_string()))
            }
            Err(_) => {
                let e = CatalogClientError::Timeout(self.timeout);
                warn!("Enrichment fetch failed: {}", e);
                Err(EnrichmentOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn apply(
        &self,
        movie_id: i64,
        patch: MoviePatch,
        token: &CancellationToken,
    ) -> EnrichmentOutcome {
        if token.is_cancelled() {
            return EnrichmentOutcome::Cancelled;
        }

        let patched =
            run_blocking(&self.store, move |store| store.patch_by_id(TARGET, movie_id, &patch))
                .await;

        match patched {
            Ok(0) => EnrichmentOutcome::NoMatchingRow,
            Ok(_) => {
                self.notifier
                    .emit(ResourcePath::collection(TARGET), ChangeKind::Patched);
                EnrichmentOutcome::Patched
            }
            Err(e) => {
                error!("Failed to patch movie {} in {}: {}", movie_id, TARGET, e);
                EnrichmentOutcome::Failed(e.to_string())
            }
        }
    }

    fn record(&self, kind: EnrichmentKind, movie_id: i64, outcome: &EnrichmentOutcome) {
        match outcome {
            EnrichmentOutcome::Patched => {
                info!("Enriched {} for movie {}", kind.as_str(), movie_id)
            }
            EnrichmentOutcome::NoMatchingRow => debug!(
                "Movie {} is not in {}, {} enrichment dropped",
                movie_id,
                TARGET,
                kind.as_str()
            ),
            // Failures were logged where they happened.
            other => debug!(
                "{} enrichment for movie {}: {}",
                kind.as_str(),
                movie_id,
                other.as_str()
            ),
        }

        ENRICHMENT_RUNS
            .with_label_values(&[kind.as_str(), outcome.as_str()])
            .inc();
    }
}

/// Enrichment running on a background task.
pub struct EnrichmentHandle {
    movie_id: i64,
    token: CancellationToken,
    task: JoinHandle<EnrichmentReport>,
}

impl EnrichmentHandle {
    pub fn movie_id(&self) -> i64 {
        self.movie_id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for both enrichments. A panicked task reports both as failed.
    pub async fn join(self) -> EnrichmentReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                let outcome = EnrichmentOutcome::Failed(e.to_string());
                EnrichmentReport {
                    movie_id: self.movie_id,
                    trailer: outcome.clone(),
                    reviews: outcome,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockCatalogClient};

    struct Harness {
        store: Arc<dyn MovieStore>,
        client: Arc<MockCatalogClient>,
        notifier: ChangeNotifier,
        enricher: Enricher,
    }

    fn harness() -> Harness {
        let store = fixtures::in_memory_store().unwrap();
        let client = Arc::new(MockCatalogClient::new());
        let notifier = ChangeNotifier::new();
        let enricher = Enricher::new(
            Arc::clone(&store),
            client.clone(),
            notifier.clone(),
            Duration::from_secs(1),
        );
        Harness {
            store,
            client,
            notifier,
            enricher,
        }
    }

    #[tokio::test]
    async fn test_trailer_patch_sets_path_and_thumbnail() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();
        h.client.add_trailer(550, fixtures::trailer("SUXWAEX2jlg")).await;
        h.client.add_trailer(550, fixtures::trailer("second0000")).await;

        let outcome = h.enricher.enrich_trailer(550, &CancellationToken::new()).await;
        assert_eq!(outcome, EnrichmentOutcome::Patched);

        let movie = h.store.get(Collection::Favorites, 550).unwrap().unwrap();
        assert_eq!(
            movie.trailer_path.as_deref(),
            Some("https://www.youtube.com/watch?v=SUXWAEX2jlg")
        );
        assert_eq!(
            movie.trailer_thumbnail_path.as_deref(),
            Some("https://img.youtube.com/vi/SUXWAEX2jlg/0.jpg")
        );
    }

    #[tokio::test]
    async fn test_reviews_patch_uses_first_review() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();
        h.client
            .add_review(550, fixtures::review("a", "First rule."))
            .await;
        h.client
            .add_review(550, fixtures::review("b", "Second rule."))
            .await;

        let outcome = h.enricher.enrich_reviews(550, &CancellationToken::new()).await;
        assert_eq!(outcome, EnrichmentOutcome::Patched);

        let movie = h.store.get(Collection::Favorites, 550).unwrap().unwrap();
        assert_eq!(movie.reviews.as_deref(), Some("First rule."));
        assert!(movie.trailer_path.is_none());
    }

    #[tokio::test]
    async fn test_non_favorite_is_not_patched() {
        let h = harness();
        h.store
            .bulk_replace(Collection::Popular, &[fixtures::movie(550, "Fight Club")])
            .unwrap();
        h.client.add_trailer(550, fixtures::trailer("SUXWAEX2jlg")).await;
        let mut sub = h.notifier.subscribe(ResourcePath::Popular);

        let outcome = h.enricher.enrich_trailer(550, &CancellationToken::new()).await;
        assert_eq!(outcome, EnrichmentOutcome::NoMatchingRow);

        let movie = h.store.get(Collection::Popular, 550).unwrap().unwrap();
        assert!(movie.trailer_path.is_none());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_no_results() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();

        let report = h.enricher.enrich(550, &CancellationToken::new()).await;
        assert_eq!(report.trailer, EnrichmentOutcome::NoResults);
        assert_eq!(report.reviews, EnrichmentOutcome::NoResults);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_swallowed() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();
        h.client
            .set_next_error(CatalogClientError::ApiError {
                status: 500,
                message: "boom".to_string(),
            })
            .await;

        let outcome = h.enricher.enrich_trailer(550, &CancellationToken::new()).await;
        assert!(matches!(outcome, EnrichmentOutcome::Failed(_)));

        let movie = h.store.get(Collection::Favorites, 550).unwrap().unwrap();
        assert!(movie.trailer_path.is_none());
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_failure() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();
        h.client.set_delay(Some(Duration::from_secs(3))).await;

        let outcome = h.enricher.enrich_reviews(550, &CancellationToken::new()).await;
        assert!(matches!(outcome, EnrichmentOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_spawned_enrichment_can_be_cancelled() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();
        h.client.add_trailer(550, fixtures::trailer("SUXWAEX2jlg")).await;
        h.client.set_delay(Some(Duration::from_millis(500))).await;

        let handle = h.enricher.spawn_enrichment(550);
        assert_eq!(handle.movie_id(), 550);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let report = handle.join().await;
        assert_eq!(report.trailer, EnrichmentOutcome::Cancelled);
        assert_eq!(report.reviews, EnrichmentOutcome::Cancelled);

        let movie = h.store.get(Collection::Favorites, 550).unwrap().unwrap();
        assert!(movie.trailer_path.is_none());
    }

    #[tokio::test]
    async fn test_spawned_enrichment_patches_both() {
        let h = harness();
        h.store.insert_favorite(&fixtures::movie(550, "Fight Club")).unwrap();
        h.client.add_trailer(550, fixtures::trailer("SUXWAEX2jlg")).await;
        h.client.add_review(550, fixtures::review("a", "Fine.")).await;

        let report = h.enricher.spawn_enrichment(550).join().await;
        assert_eq!(report.trailer, EnrichmentOutcome::Patched);
        assert_eq!(report.reviews, EnrichmentOutcome::Patched);

        let movie = h.store.get(Collection::Favorites, 550).unwrap().unwrap();
        assert!(movie.trailer_path.is_some());
        assert_eq!(movie.reviews.as_deref(), Some("Fine."));
    }
}
