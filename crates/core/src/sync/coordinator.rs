//! Sync coordinator implementation.
//!
//! Each sort key owns a lane:
//! - Cycles on one lane are serialized by the lane lock
//! - Lanes run independently of each other
//! - A cycle is fetch, transform, replace, notify; only replace touches storage

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogClient, CollectionRequest, SortKey};
use crate::metrics::{ROWS_SKIPPED, SYNC_CYCLES, SYNC_DURATION};
use crate::notifier::{ChangeKind, ChangeNotifier};
use crate::router::ResourcePath;
use crate::store::{run_blocking, MovieStore};

use super::config::SyncConfig;
use super::transform;
use super::types::{SyncError, SyncPhase, SyncReport, SyncStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-sort-key sync state.
struct Lane {
    sort_key: SortKey,
    /// Held for the whole cycle.
    cycle_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<SyncStatus>,
    /// Parent of every cycle token on this lane. Swapped out when superseded.
    epoch: Mutex<CancellationToken>,
    /// Cycles running or waiting for the lock.
    pending: AtomicUsize,
}

impl Lane {
    fn new(sort_key: SortKey, shutdown: &CancellationToken) -> Self {
        let (status, _) = watch::channel(SyncStatus::new(sort_key));
        Self {
            sort_key,
            cycle_lock: tokio::sync::Mutex::new(()),
            status,
            epoch: Mutex::new(shutdown.child_token()),
            pending: AtomicUsize::new(0),
        }
    }

    fn cycle_token(&self) -> CancellationToken {
        lock(&self.epoch).child_token()
    }

    /// Cancel every cycle started so far; later cycles are unaffected.
    fn supersede(&self, shutdown: &CancellationToken) {
        let previous = std::mem::replace(&mut *lock(&self.epoch), shutdown.child_token());
        previous.cancel();
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.status.send_modify(|s| s.phase = phase);
    }

    /// Count a cycle as pending until the returned guard drops.
    fn enter(&self) -> PendingCycle<'_> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.status.send_modify(|s| s.in_flight = true);
        PendingCycle { lane: self }
    }

    /// Record a finished cycle. Only called while holding `cycle_lock`.
    fn settle(&self, result: &Result<SyncReport, SyncError>) {
        self.status.send_modify(|s| match result {
            Ok(report) => {
                s.last_success_at = Some(Utc::now());
                s.last_error = None;
                s.last_row_count = Some(report.inserted);
            }
            Err(SyncError::Cancelled) => {}
            Err(e) => {
                s.phase = SyncPhase::Failed;
                s.last_error = Some(e.to_string());
            }
        });
    }
}

/// Keeps `in_flight` set while a cycle runs or waits for the lane.
///
/// Dropping it, including when the cycle future itself is dropped, clears
/// `in_flight` once no other cycle is pending. Never touches the phase.
struct PendingCycle<'a> {
    lane: &'a Lane,
}

impl Drop for PendingCycle<'_> {
    fn drop(&mut self) {
        let remaining = self.lane.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        self.lane.status.send_modify(|s| s.in_flight = remaining > 0);
    }
}

/// Returns the lane to `Idle` when the cycle holding the lock ends.
struct PhaseReset<'a> {
    lane: &'a Lane,
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.lane.set_phase(SyncPhase::Idle);
    }
}

struct Inner {
    store: Arc<dyn MovieStore>,
    client: Arc<dyn CatalogClient>,
    notifier: ChangeNotifier,
    config: SyncConfig,
    popular: Lane,
    top_rated: Lane,
    active_mode: Mutex<SortKey>,
    shutdown: CancellationToken,
}

impl Inner {
    fn lane(&self, sort_key: SortKey) -> &Lane {
        match sort_key {
            SortKey::Popular => &self.popular,
            SortKey::TopRated => &self.top_rated,
        }
    }
}

/// Coordinates full-collection refreshes.
///
/// Cheap to clone; clones share lanes and status.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Create a new coordinator.
    pub fn new(
        store: Arc<dyn MovieStore>,
        client: Arc<dyn CatalogClient>,
        notifier: ChangeNotifier,
        config: SyncConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let active_mode = Mutex::new(config.default_sort_mode);

        Self {
            inner: Arc::new(Inner {
                store,
                client,
                notifier,
                popular: Lane::new(SortKey::Popular, &shutdown),
                top_rated: Lane::new(SortKey::TopRated, &shutdown),
                config,
                active_mode,
                shutdown,
            }),
        }
    }

    /// Run one refresh cycle for `sort_key`, waiting for any cycle already running on it.
    ///
    /// On error the collection keeps its previous rows.
    pub async fn sync(
        &self,
        sort_key: SortKey,
        token: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let lane = self.inner.lane(sort_key);
        let cycle = lane.cycle_token();

        let pending = lane.enter();
        let result = self.run_serialized(lane, token, &cycle).await;
        drop(pending);

        self.record(sort_key, &result);
        result
    }

    /// Run a refresh on a background task.
    pub fn spawn_refresh(&self, sort_key: SortKey) -> RefreshHandle {
        let token = CancellationToken::new();
        let coordinator = self.clone();
        let task_token = token.clone();

        let task = tokio::spawn(async move { coordinator.sync(sort_key, &task_token).await });

        RefreshHandle {
            sort_key,
            token,
            task,
        }
    }

    /// Make `sort_key` the active mode and refresh it.
    ///
    /// In-flight cycles of the mode being replaced are cancelled.
    pub fn select_sort_mode(&self, sort_key: SortKey) -> RefreshHandle {
        let previous = std::mem::replace(&mut *lock(&self.inner.active_mode), sort_key);
        if previous != sort_key {
            info!("Sort mode changed from {} to {}", previous, sort_key);
            self.inner.lane(previous).supersede(&self.inner.shutdown);
        }
        self.spawn_refresh(sort_key)
    }

    /// The sort mode last selected.
    pub fn active_sort_mode(&self) -> SortKey {
        *lock(&self.inner.active_mode)
    }

    /// Snapshot of a collection's sync status.
    pub fn status(&self, sort_key: SortKey) -> SyncStatus {
        self.inner.lane(sort_key).status.borrow().clone()
    }

    /// Subscribe to a collection's sync status.
    pub fn watch_status(&self, sort_key: SortKey) -> watch::Receiver<SyncStatus> {
        self.inner.lane(sort_key).status.subscribe()
    }

    /// Cancel every running and future cycle.
    pub fn shutdown(&self) {
        info!("Stopping sync coordinator");
        self.inner.shutdown.cancel();
    }

    async fn run_serialized(
        &self,
        lane: &Lane,
        token: &CancellationToken,
        cycle: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let _guard = tokio::select! {
            guard = lane.cycle_lock.lock() => guard,
            _ = token.cancelled() => return Err(SyncError::Cancelled),
            _ = cycle.cancelled() => return Err(SyncError::Cancelled),
        };
        // Declared after the guard so the phase resets before the lock is released.
        let _phase = PhaseReset { lane };

        let result = self.run_cycle(lane, token, cycle).await;
        lane.settle(&result);
        result
    }

    async fn run_cycle(
        &self,
        lane: &Lane,
        token: &CancellationToken,
        cycle: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let sort_key = lane.sort_key;
        let config = &self.inner.config;
        let request = CollectionRequest {
            sort_key,
            language: config.language.clone(),
            page: config.page,
        };

        lane.set_phase(SyncPhase::Fetching);
        let timeout = config.fetch_timeout();
        let fetch = tokio::time::timeout(timeout, self.inner.client.fetch_collection(&request));
        let records = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SyncError::Cancelled),
            _ = cycle.cancelled() => return Err(SyncError::Cancelled),
            fetched = fetch => fetched.map_err(|_| SyncError::Timeout(timeout))??,
        };

        lane.set_phase(SyncPhase::Transforming);
        let fetched = records.len();
        let rows = transform::to_rows(records);

        if token.is_cancelled() || cycle.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        lane.set_phase(SyncPhase::Replacing);
        let collection = sort_key.collection();
        let outcome = run_blocking(&self.inner.store, move |store| {
            store.bulk_replace(collection, &rows)
        })
        .await?;

        lane.set_phase(SyncPhase::Notifying);
        self.inner
            .notifier
            .emit(ResourcePath::collection(collection), ChangeKind::Replaced);

        Ok(SyncReport {
            sort_key,
            fetched,
            inserted: outcome.inserted,
            skipped: outcome.skipped,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn record(&self, sort_key: SortKey, result: &Result<SyncReport, SyncError>) {
        let collection = sort_key.collection().table_name();
        match result {
            Ok(report) => {
                info!(
                    "Synced {}: {} fetched, {} stored, {} skipped in {}ms",
                    sort_key, report.fetched, report.inserted, report.skipped, report.duration_ms
                );
                SYNC_CYCLES.with_label_values(&[collection, "success"]).inc();
                SYNC_DURATION
                    .with_label_values(&[collection])
                    .observe(report.duration_ms as f64 / 1000.0);
                if report.skipped > 0 {
                    ROWS_SKIPPED
                        .with_label_values(&[collection])
                        .inc_by(report.skipped as u64);
                }
            }
            Err(e) => {
                match e {
                    SyncError::Cancelled => debug!("Sync of {} cancelled", sort_key),
                    e if e.is_contained() => {
                        warn!("Sync of {} failed, keeping previous rows: {}", sort_key, e)
                    }
                    e => error!("Sync of {} failed: {}", sort_key, e),
                }
                SYNC_CYCLES
                    .with_label_values(&[collection, e.result_label()])
                    .inc();
            }
        }
    }
}

/// A refresh running on a background task.
pub struct RefreshHandle {
    sort_key: SortKey,
    token: CancellationToken,
    task: JoinHandle<Result<SyncReport, SyncError>>,
}

impl RefreshHandle {
    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    /// Ask the refresh to stop. It never stops once storage has been written.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the refresh to finish.
    pub async fn join(self) -> Result<SyncReport, SyncError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Task(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogClientError;
    use crate::store::{Collection, MovieQuery};
    use crate::testing::{fixtures, MockCatalogClient};
    use std::time::Duration;

    struct Harness {
        store: Arc<dyn MovieStore>,
        client: Arc<MockCatalogClient>,
        notifier: ChangeNotifier,
        coordinator: SyncCoordinator,
    }

    fn harness(config: SyncConfig) -> Harness {
        let store = fixtures::in_memory_store().unwrap();
        let client = Arc::new(MockCatalogClient::new());
        let notifier = ChangeNotifier::new();
        let coordinator = SyncCoordinator::new(
            Arc::clone(&store),
            client.clone(),
            notifier.clone(),
            config,
        );
        Harness {
            store,
            client,
            notifier,
            coordinator,
        }
    }

    fn ids(store: &Arc<dyn MovieStore>, collection: Collection) -> Vec<i64> {
        let mut ids = store
            .query(collection, &MovieQuery::new())
            .unwrap()
            .movie_ids();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_sync_replaces_collection_and_notifies() {
        let h = harness(SyncConfig::default());
        let mut sub = h.notifier.subscribe(ResourcePath::Popular);
        h.client
            .set_collection(
                SortKey::Popular,
                vec![fixtures::catalog_movie(10, "Heat"), fixtures::catalog_movie(20, "Ronin")],
            )
            .await;

        let report = h
            .coordinator
            .sync(SortKey::Popular, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(ids(&h.store, Collection::Popular), vec![10, 20]);

        let event = sub.try_recv().expect("Replace should notify");
        assert_eq!(event.kind, ChangeKind::Replaced);

        let status = h.coordinator.status(SortKey::Popular);
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(!status.in_flight);
        assert!(status.last_success_at.is_some());
        assert_eq!(status.last_row_count, Some(2));
    }

    #[tokio::test]
    async fn test_sync_sends_configured_request() {
        let h = harness(SyncConfig {
            language: "it-IT".to_string(),
            page: 2,
            ..Default::default()
        });

        h.coordinator
            .sync(SortKey::TopRated, &CancellationToken::new())
            .await
            .unwrap();

        let calls = h.client.recorded_calls().await;
        assert_eq!(
            calls,
            vec![crate::testing::RecordedCatalogCall::FetchCollection(
                CollectionRequest {
                    sort_key: SortKey::TopRated,
                    language: "it-IT".to_string(),
                    page: 2,
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_rows() {
        let h = harness(SyncConfig::default());
        h.client
            .set_collection(SortKey::Popular, vec![fixtures::catalog_movie(10, "Heat")])
            .await;
        h.coordinator
            .sync(SortKey::Popular, &CancellationToken::new())
            .await
            .unwrap();

        let mut sub = h.notifier.subscribe(ResourcePath::Popular);
        h.client
            .set_next_error(CatalogClientError::ParseError("truncated body".into()))
            .await;

        let err = h
            .coordinator
            .sync(SortKey::Popular, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_contained());
        assert_eq!(ids(&h.store, Collection::Popular), vec![10]);
        assert!(sub.try_recv().is_none());

        let status = h.coordinator.status(SortKey::Popular);
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(status.last_error.unwrap().contains("truncated body"));
        assert_eq!(status.last_row_count, Some(1));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let h = harness(SyncConfig {
            fetch_timeout_secs: 1,
            ..Default::default()
        });
        h.client.set_delay(Some(Duration::from_secs(3))).await;

        let err = h
            .coordinator
            .sync(SortKey::Popular, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Timeout(_)));
        assert_eq!(h.store.count(Collection::Popular).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_never_writes() {
        let h = harness(SyncConfig::default());
        h.client
            .set_collection(SortKey::Popular, vec![fixtures::catalog_movie(10, "Heat")])
            .await;
        h.client.set_delay(Some(Duration::from_secs(5))).await;

        let handle = h.coordinator.spawn_refresh(SortKey::Popular);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(h.store.count(Collection::Popular).unwrap(), 0);
        assert!(h.coordinator.status(SortKey::Popular).last_error.is_none());
    }

    #[tokio::test]
    async fn test_select_sort_mode_cancels_superseded_mode() {
        let h = harness(SyncConfig::default());
        h.client.set_delay(Some(Duration::from_secs(5))).await;
        assert_eq!(h.coordinator.active_sort_mode(), SortKey::Popular);

        let popular = h.coordinator.spawn_refresh(SortKey::Popular);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let top_rated = h.coordinator.select_sort_mode(SortKey::TopRated);
        assert_eq!(h.coordinator.active_sort_mode(), SortKey::TopRated);

        let err = popular.join().await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));

        top_rated.cancel();
        assert!(matches!(
            top_rated.join().await.unwrap_err(),
            SyncError::Cancelled
        ));
    }

    #[tokio::test]
    async fn test_superseded_lane_accepts_new_cycles() {
        let h = harness(SyncConfig::default());
        h.client
            .set_collection(SortKey::Popular, vec![fixtures::catalog_movie(10, "Heat")])
            .await;

        h.coordinator.select_sort_mode(SortKey::TopRated).join().await.unwrap();

        let report = h
            .coordinator
            .sync(SortKey::Popular, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
    }

    #[tokio::test]
    async fn test_same_key_cycles_are_serialized() {
        let h = harness(SyncConfig::default());
        h.client.set_delay(Some(Duration::from_millis(150))).await;

        let a = h.coordinator.spawn_refresh(SortKey::Popular);
        let b = h.coordinator.spawn_refresh(SortKey::Popular);
        a.join().await.unwrap();
        b.join().await.unwrap();

        assert_eq!(h.client.call_count().await, 2);
        assert_eq!(h.client.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_concurrently() {
        let h = harness(SyncConfig::default());
        h.client.set_delay(Some(Duration::from_millis(300))).await;

        let a = h.coordinator.spawn_refresh(SortKey::Popular);
        let b = h.coordinator.spawn_refresh(SortKey::TopRated);
        a.join().await.unwrap();
        b.join().await.unwrap();

        assert_eq!(h.client.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_watch_status_sees_success() {
        let h = harness(SyncConfig::default());
        let mut rx = h.coordinator.watch_status(SortKey::TopRated);

        h.coordinator
            .sync(SortKey::TopRated, &CancellationToken::new())
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let status = rx.borrow_and_update().clone();
        assert!(status.last_success_at.is_some());
        assert_eq!(status.last_row_count, Some(0));
    }

    #[tokio::test]
    async fn test_dropped_sync_resets_status() {
        let h = harness(SyncConfig::default());
        h.client.set_delay(Some(Duration::from_millis(500))).await;

        let token = CancellationToken::new();
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            h.coordinator.sync(SortKey::Popular, &token),
        )
        .await;
        assert!(result.is_err());

        let status = h.coordinator.status(SortKey::Popular);
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(!status.in_flight);
        assert!(status.last_error.is_none());

        h.client.set_delay(None).await;
        h.coordinator.sync(SortKey::Popular, &token).await.unwrap();
        assert!(!h.coordinator.status(SortKey::Popular).in_flight);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_running_phase() {
        let h = harness(SyncConfig::default());
        h.client.set_delay(Some(Duration::from_millis(400))).await;

        let running = h.coordinator.spawn_refresh(SortKey::Popular);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = h.coordinator.spawn_refresh(SortKey::Popular);
        tokio::time::sleep(Duration::from_millis(50)).await;

        waiting.cancel();
        assert!(matches!(waiting.join().await, Err(SyncError::Cancelled)));

        let status = h.coordinator.status(SortKey::Popular);
        assert_eq!(status.phase, SyncPhase::Fetching);
        assert!(status.in_flight);

        running.join().await.unwrap();
        let status = h.coordinator.status(SortKey::Popular);
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!(!status.in_flight);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight() {
        let h = harness(SyncConfig::default());
        h.client.set_delay(Some(Duration::from_secs(5))).await;

        let handle = h.coordinator.spawn_refresh(SortKey::Popular);
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.coordinator.shutdown();

        assert!(matches!(handle.join().await, Err(SyncError::Cancelled)));
    }
}
