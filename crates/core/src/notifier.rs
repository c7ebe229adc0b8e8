//! Change notifier - per-path pub/sub for store mutations.
//!
//! Every successful mutation emits one [`ChangeEvent`] naming the affected
//! resource path. Events carry no payload; observers re-query.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use prometheus::IntGauge;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics::{ACTIVE_SUBSCRIPTIONS, CHANGE_EVENTS_EMITTED};
use crate::router::ResourcePath;

/// What kind of mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A whole collection was swapped by sync.
    Replaced,
    /// A favorite was added.
    Inserted,
    /// Enrichment fields of a row were patched.
    Patched,
    /// A favorite was removed.
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Replaced => "replaced",
            ChangeKind::Inserted => "inserted",
            ChangeKind::Patched => "patched",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: ResourcePath,
    pub kind: ChangeKind,
    pub at: DateTime<Utc>,
}

/// Identifier of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Subscriber {
    path: ResourcePath,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

struct Registry {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    /// Shared by every notifier in the process, so only ever moved by deltas.
    gauge: IntGauge,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            subscribers: Mutex::default(),
            gauge: ACTIVE_SUBSCRIPTIONS.clone(),
        }
    }
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        // A panicking observer must not take notifications down with it.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            self.gauge.dec();
        }
        removed
    }
}

/// Removes its subscriber from the registry when dropped.
struct Registration {
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl Registration {
    fn cancel(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Pub/sub channel for store changes.
///
/// This is cheaply cloneable; clones share one subscriber registry.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Registry>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::default(),
                gauge,
            }),
        }
    }

    /// Subscribe to changes under `path`.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes.
    pub fn subscribe(&self, path: ResourcePath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId(Uuid::new_v4());

        self.registry.lock().insert(id, Subscriber { path, tx });
        self.registry.gauge.inc();

        tracing::debug!("Subscription {} registered for {}", id, path);

        Subscription {
            path,
            rx,
            registration: Registration {
                id,
                registry: Arc::downgrade(&self.registry),
            },
        }
    }

    /// Subscribe with a callback, invoked on a spawned task for every event.
    ///
    /// Must be called within a Tokio runtime. The callback stops once the
    /// handle is passed to [`ChangeNotifier::unsubscribe`] or dropped.
    pub fn subscribe_with<F>(&self, path: ResourcePath, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent) + Send + 'static,
    {
        let Subscription {
            path,
            mut rx,
            registration,
        } = self.subscribe(path);

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                callback(event);
            }
        });

        SubscriptionHandle {
            path,
            task,
            registration,
        }
    }

    /// Cancel a callback subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = handle.registration.cancel();
        tracing::debug!("Subscription {} removed", handle.registration.id);
        removed
    }

    /// Emit a change for `path`. Returns how many subscribers it was delivered to.
    pub fn emit(&self, path: ResourcePath, kind: ChangeKind) -> usize {
        let event = ChangeEvent {
            path,
            kind,
            at: Utc::now(),
        };

        let mut subscribers = self.registry.lock();
        let before = subscribers.len();
        let mut delivered = 0;
        subscribers.retain(|_, subscriber| {
            if !subscriber.path.covers(&event.path) {
                return true;
            }
            match subscriber.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                // Receiver is gone; prune it.
                Err(_) => false,
            }
        });
        let pruned = before - subscribers.len();
        drop(subscribers);
        if pruned > 0 {
            self.registry.gauge.sub(pruned as i64);
        }

        CHANGE_EVENTS_EMITTED
            .with_label_values(&[kind.as_str()])
            .inc();
        tracing::debug!("Emitted {:?} for {} to {} subscribers", kind, path, delivered);

        delivered
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }
}

/// A channel-backed subscription.
pub struct Subscription {
    path: ResourcePath,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    registration: Registration,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.registration.id
    }

    pub fn path(&self) -> ResourcePath {
        self.path
    }

    /// Wait for the next event. Returns `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// Handle of a callback subscription.
pub struct SubscriptionHandle {
    path: ResourcePath,
    task: JoinHandle<()>,
    registration: Registration,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.registration.id
    }

    pub fn path(&self) -> ResourcePath {
        self.path
    }

    /// True once the forwarding task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscriber_receives_event_for_its_path() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe(ResourcePath::Popular);

        let delivered = notifier.emit(ResourcePath::Popular, ChangeKind::Replaced);
        assert_eq!(delivered, 1);

        let event = sub.recv().await.expect("Should receive event");
        assert_eq!(event.path, ResourcePath::Popular);
        assert_eq!(event.kind, ChangeKind::Replaced);
    }

    #[test]
    fn test_recv_wakes_on_emit() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe(ResourcePath::TopRated);

        let mut recv = tokio_test::task::spawn(sub.recv());
        tokio_test::assert_pending!(recv.poll());

        notifier.emit(ResourcePath::TopRated, ChangeKind::Replaced);
        assert!(recv.is_woken());
        let event = tokio_test::assert_ready!(recv.poll()).expect("Should receive event");
        assert_eq!(event.kind, ChangeKind::Replaced);
    }

    #[test]
    fn test_events_are_scoped_by_path() {
        let notifier = ChangeNotifier::new();
        let mut popular = notifier.subscribe(ResourcePath::Popular);
        let mut favorites = notifier.subscribe(ResourcePath::Favorites);
        let mut item = notifier.subscribe(ResourcePath::Favorite { movie_id: 550 });

        notifier.emit(ResourcePath::Favorite { movie_id: 13 }, ChangeKind::Deleted);

        assert!(popular.try_recv().is_none());
        assert!(item.try_recv().is_none());
        let event = favorites.try_recv().expect("Collection subscriber sees item events");
        assert_eq!(event.path, ResourcePath::Favorite { movie_id: 13 });

        notifier.emit(ResourcePath::Favorites, ChangeKind::Patched);
        assert!(item.try_recv().is_some());
        assert!(favorites.try_recv().is_some());
        assert!(popular.try_recv().is_none());
    }

    #[test]
    fn test_multiple_subscribers_same_path() {
        let notifier = ChangeNotifier::new();
        let mut a = notifier.subscribe(ResourcePath::TopRated);
        let mut b = notifier.subscribe(ResourcePath::TopRated);

        assert_eq!(notifier.emit(ResourcePath::TopRated, ChangeKind::Replaced), 2);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let notifier = ChangeNotifier::new();
        let sub = notifier.subscribe(ResourcePath::Popular);
        assert_eq!(notifier.subscriber_count(), 1);

        drop(sub);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.emit(ResourcePath::Popular, ChangeKind::Replaced), 0);
    }

    #[tokio::test]
    async fn test_callback_subscription_and_unsubscribe() {
        let notifier = ChangeNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = notifier.subscribe_with(ResourcePath::Favorites, move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.emit(ResourcePath::Favorites, ChangeKind::Inserted);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(notifier.unsubscribe(handle));
        assert_eq!(notifier.subscriber_count(), 0);

        notifier.emit(ResourcePath::Favorites, ChangeKind::Inserted);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_leak() {
        let notifier = ChangeNotifier::new();
        {
            let _handle = notifier.subscribe_with(ResourcePath::Popular, |_| {});
            assert_eq!(notifier.subscriber_count(), 1);
        }
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_gauge_counts_across_notifiers() {
        let gauge = IntGauge::new("test_active_subscriptions", "test").unwrap();
        let a = ChangeNotifier::with_gauge(gauge.clone());
        let b = ChangeNotifier::with_gauge(gauge.clone());

        let a1 = a.subscribe(ResourcePath::Popular);
        let _a2 = a.subscribe(ResourcePath::Favorites);
        let mut b1 = b.subscribe(ResourcePath::TopRated);
        assert_eq!(gauge.get(), 3);

        drop(a1);
        assert_eq!(gauge.get(), 2);

        // Emitting on one notifier must not reset the other's share.
        a.emit(ResourcePath::Favorites, ChangeKind::Patched);
        assert_eq!(gauge.get(), 2);

        // A closed receiver is pruned on emit and counted out once.
        b1.rx.close();
        b.emit(ResourcePath::TopRated, ChangeKind::Replaced);
        assert_eq!(gauge.get(), 1);
        drop(b1);
        assert_eq!(gauge.get(), 1);
    }

    #[test]
    fn test_subscription_outlives_notifier() {
        let notifier = ChangeNotifier::new();
        let mut sub = notifier.subscribe(ResourcePath::Popular);
        drop(notifier);
        assert!(sub.try_recv().is_none());
        // Dropping after the registry is gone is a no-op.
        drop(sub);
    }
}
