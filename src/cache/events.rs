//! Cache invalidation events.
//!
//! A closed set of event kinds and a synchronous publish/subscribe bus. Code
//! that mutates trips or favourites publishes after the write commits; fetchers
//! subscribe and refresh their cached view.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_PUBLISHED: &str = "tripkit_cache_event_published_total";
const METRIC_SUBSCRIBER_PANIC: &str = "tripkit_cache_subscriber_panic_total";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// Kinds of cache invalidation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A trip was created.
    TripCreated,
    /// Checkpoints of some trip changed.
    CheckpointsInvalidated,
    /// Map data of some user changed.
    MapDataInvalidated,
    /// The favourites collection should be reloaded.
    FavoritesInvalidated,
    /// A favourite place was added.
    FavoriteAdded,
    /// A favourite place was removed.
    FavoriteRemoved,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::TripCreated,
        EventKind::CheckpointsInvalidated,
        EventKind::MapDataInvalidated,
        EventKind::FavoritesInvalidated,
        EventKind::FavoriteAdded,
        EventKind::FavoriteRemoved,
    ];

    /// Stable wire name shared with the rest of the application.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TripCreated => "tripCreated",
            EventKind::CheckpointsInvalidated => "checkpointsInvalidated",
            EventKind::MapDataInvalidated => "mapDataInvalidated",
            EventKind::FavoritesInvalidated => "favoritesInvalidated",
            EventKind::FavoriteAdded => "favoriteAdded",
            EventKind::FavoriteRemoved => "favoriteRemoved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown cache event `{0}`")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownEventKind(value.to_string()))
    }
}

/// A published event as seen by subscribers.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch within this process.
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
    /// Optional event-specific detail, e.g. the id of the created trip.
    pub payload: Option<Value>,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch, payload: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
            payload,
        }
    }
}

/// Outcome of a single publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Callbacks that returned normally.
    pub delivered: usize,
    /// Callbacks that panicked.
    pub failed: usize,
}

type Callback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<EventKind, Vec<(u64, Callback)>>,
}

/// Process-wide invalidation bus.
///
/// Publishing is synchronous: every callback registered for the kind runs, in
/// registration order, before `publish` returns. Callbacks run outside the
/// registry lock, so they may subscribe or unsubscribe freely.
pub struct CacheEventManager {
    registry: Arc<Mutex<Registry>>,
    epoch_counter: AtomicU64,
}

impl CacheEventManager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            epoch_counter: AtomicU64::new(0),
        }
    }

    fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Register `callback` for `kind`.
    ///
    /// The subscription stays active until [`Subscription::unsubscribe`] is
    /// called; dropping the handle does not unsubscribe.
    #[must_use = "keep the handle to unsubscribe later"]
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let mut registry = mutex_lock(&self.registry, SOURCE, "subscribe");
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .subscribers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        debug!(event_kind = %kind, subscription_id = id, "Cache event subscriber registered");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Publish `kind` without a payload.
    pub fn publish(&self, kind: EventKind) -> PublishReport {
        self.publish_with(kind, None)
    }

    /// Publish `kind`, invoking every current subscriber.
    ///
    /// A panicking subscriber is logged and counted; the remaining subscribers
    /// still run.
    pub fn publish_with(&self, kind: EventKind, payload: Option<Value>) -> PublishReport {
        let event = CacheEvent::new(kind, self.next_epoch(), payload);
        let callbacks: Vec<Callback> = mutex_lock(&self.registry, SOURCE, "publish")
            .subscribers
            .get(&kind)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        counter!(METRIC_PUBLISHED, "kind" => kind.as_str()).increment(1);
        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = %kind,
            subscribers = callbacks.len(),
            "Cache event published"
        );

        let mut report = PublishReport::default();
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    counter!(METRIC_SUBSCRIBER_PANIC, "kind" => kind.as_str()).increment(1);
                    warn!(
                        event_id = %event.id,
                        event_kind = %kind,
                        panic = %panic_message(panic.as_ref()),
                        "Cache event subscriber panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        mutex_lock(&self.registry, SOURCE, "subscriber_count")
            .subscribers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl Default for CacheEventManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`CacheEventManager::subscribe`].
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    kind: EventKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Remove the callback. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        let mut registry = mutex_lock(&registry, SOURCE, "unsubscribe");
        if let Some(subs) = registry.subscribers.get_mut(&self.kind) {
            subs.retain(|(id, _)| *id != self.id);
            if subs.is_empty() {
                registry.subscribers.remove(&self.kind);
            }
        }
        debug!(event_kind = %self.kind, subscription_id = self.id, "Cache event subscriber removed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    type Recorder = Box<dyn Fn(&CacheEvent) + Send + Sync>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Recorder) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::clone(&log);
        let make = move |label: &'static str| {
            let log = Arc::clone(&handle);
            Box::new(move |_: &CacheEvent| log.lock().expect("log lock").push(label.to_string()))
                as Recorder
        };
        (log, make)
    }

    #[test]
    fn wire_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(
            "tripDeleted".parse::<EventKind>(),
            Err(UnknownEventKind("tripDeleted".to_string()))
        );
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = CacheEventManager::new();
        let report = bus.publish(EventKind::TripCreated);
        assert_eq!(report, PublishReport::default());
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let bus = CacheEventManager::new();
        let (log, make) = recorder();

        let _a = bus.subscribe(EventKind::TripCreated, make("a"));
        let _b = bus.subscribe(EventKind::TripCreated, make("b"));
        let _other = bus.subscribe(EventKind::FavoriteAdded, make("other"));
        let _c = bus.subscribe(EventKind::TripCreated, make("c"));

        let report = bus.publish(EventKind::TripCreated);

        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock().expect("log lock"), vec!["a", "b", "c"]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_rest() {
        let bus = CacheEventManager::new();
        let (log, make) = recorder();

        let _first = bus.subscribe(EventKind::MapDataInvalidated, make("first"));
        let _boom = bus.subscribe(EventKind::MapDataInvalidated, |_| panic!("subscriber failure"));
        let _second = bus.subscribe(EventKind::MapDataInvalidated, make("second"));
        let _third = bus.subscribe(EventKind::MapDataInvalidated, make("third"));

        let report = bus.publish(EventKind::MapDataInvalidated);

        assert_eq!(report, PublishReport { delivered: 3, failed: 1 });
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = CacheEventManager::new();
        let (log, make) = recorder();

        let keep = bus.subscribe(EventKind::FavoriteRemoved, make("keep"));
        let drop_me = bus.subscribe(EventKind::FavoriteRemoved, make("drop"));
        assert_eq!(bus.subscriber_count(EventKind::FavoriteRemoved), 2);

        drop_me.unsubscribe();
        drop_me.unsubscribe();
        assert!(!drop_me.is_active());
        assert!(keep.is_active());
        assert_eq!(bus.subscriber_count(EventKind::FavoriteRemoved), 1);

        bus.publish(EventKind::FavoriteRemoved);
        assert_eq!(*log.lock().expect("log lock"), vec!["keep"]);
    }

    #[test]
    fn unsubscribe_after_bus_dropped_is_harmless() {
        let bus = CacheEventManager::new();
        let subscription = bus.subscribe(EventKind::TripCreated, |_| {});
        drop(bus);
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }

    #[test]
    fn payload_and_epochs_reach_subscribers() {
        let bus = CacheEventManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(EventKind::TripCreated, move |event| {
            sink.lock()
                .expect("seen lock")
                .push((event.epoch, event.payload.clone()));
        });

        bus.publish_with(EventKind::TripCreated, Some(json!({ "tripId": "t-1" })));
        bus.publish(EventKind::TripCreated);

        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 2);
        assert!(seen[0].0 < seen[1].0);
        assert_eq!(seen[0].1, Some(json!({ "tripId": "t-1" })));
        assert_eq!(seen[1].1, None);
    }

    #[test]
    fn callback_may_unsubscribe_during_publish() {
        let bus = Arc::new(CacheEventManager::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);

        let subscription = bus.subscribe(EventKind::FavoriteAdded, move |_| {
            if let Some(sub) = inner.lock().expect("slot lock").as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().expect("slot lock") = Some(subscription);

        assert_eq!(bus.publish(EventKind::FavoriteAdded).delivered, 1);
        assert_eq!(bus.subscriber_count(EventKind::FavoriteAdded), 0);
    }
}
