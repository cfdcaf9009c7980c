//! Event-driven refresh loop shared by the data fetchers.
//!
//! A [`Watcher`] subscribes a [`Refresh`] implementation to the event bus,
//! debounces bursts, and broadcasts every completed load on a watch channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheEvent, CacheEventManager, Debouncer, EventKind, Subscription, mutex_lock};

use super::error::FetchError;

const SOURCE: &str = "application::watcher";
const METRIC_REFRESH: &str = "tripkit_refresh_total";

/// How much a refresh reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefreshMode {
    /// Re-query and merge into the cached value.
    Incremental,
    /// Bypass the cache and replace the value.
    Full,
}

impl RefreshMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Label used in logs, metrics and the debouncer.
    fn name(&self) -> &'static str;

    /// Event kinds to subscribe to.
    fn kinds(&self) -> &'static [EventKind];

    /// Refresh mode for `event`, or `None` when it does not concern this
    /// watcher.
    fn mode_for(&self, event: &CacheEvent) -> Option<RefreshMode>;

    /// Initial load, served from the cache when possible.
    async fn load(&self) -> Result<Arc<Self::Output>, FetchError>;

    async fn refresh(&self, mode: RefreshMode) -> Result<Arc<Self::Output>, FetchError>;
}

/// Latest state published by a [`Watcher`].
#[derive(Debug)]
pub struct WatchState<T> {
    pub value: Option<Arc<T>>,
    /// Completed event-driven refreshes, successful or not.
    pub refreshes: u64,
    pub last_error: Option<String>,
}

impl<T> Clone for WatchState<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            refreshes: self.refreshes,
            last_error: self.last_error.clone(),
        }
    }
}

impl<T> Default for WatchState<T> {
    fn default() -> Self {
        Self {
            value: None,
            refreshes: 0,
            last_error: None,
        }
    }
}

struct Shared<R: Refresh> {
    refresher: R,
    pending: Mutex<Option<RefreshMode>>,
    state: watch::Sender<WatchState<R::Output>>,
}

impl<R: Refresh> Shared<R> {
    fn escalate(&self, mode: RefreshMode) {
        let mut pending = mutex_lock(&self.pending, SOURCE, "escalate");
        *pending = Some(pending.map_or(mode, |current| current.max(mode)));
    }

    async fn run_pending(&self) {
        let Some(mode) = mutex_lock(&self.pending, SOURCE, "take_pending").take() else {
            return;
        };
        let name = self.refresher.name();
        counter!(METRIC_REFRESH, "watcher" => name, "mode" => mode.as_str()).increment(1);
        debug!(watcher = name, mode = mode.as_str(), "Refresh started");

        let result = self.refresher.refresh(mode).await;
        self.state.send_modify(|state| {
            state.refreshes += 1;
            match result {
                Ok(value) => {
                    state.value = Some(value);
                    state.last_error = None;
                }
                Err(err) => {
                    warn!(watcher = name, mode = mode.as_str(), error = %err, "Refresh failed");
                    state.last_error = Some(err.to_string());
                }
            }
        });
    }
}

/// Keeps one cached view fresh while it is alive.
///
/// Dropping the watcher unsubscribes it and cancels any scheduled refresh;
/// a refresh already running completes but its result is still published.
pub struct Watcher<R: Refresh> {
    shared: Arc<Shared<R>>,
    debouncer: Arc<Debouncer>,
    subscriptions: Vec<Subscription>,
}

impl<R: Refresh> Watcher<R> {
    /// Subscribe `refresher` to `events`. Must be called inside a Tokio runtime.
    pub fn start(events: &CacheEventManager, refresher: R, window: Duration) -> Self {
        let (state, _) = watch::channel(WatchState::default());
        let shared = Arc::new(Shared {
            refresher,
            pending: Mutex::new(None),
            state,
        });

        let name = shared.refresher.name();
        let action_shared = Arc::clone(&shared);
        let debouncer = Arc::new(Debouncer::new(
            name,
            Handle::current(),
            window,
            move || {
                let shared = Arc::clone(&action_shared);
                async move { shared.run_pending().await }
            },
        ));

        let subscriptions = shared
            .refresher
            .kinds()
            .iter()
            .map(|&kind| {
                let shared = Arc::clone(&shared);
                let debouncer = Arc::clone(&debouncer);
                events.subscribe(kind, move |event| {
                    if let Some(mode) = shared.refresher.mode_for(event) {
                        shared.escalate(mode);
                        debouncer.trigger();
                    }
                })
            })
            .collect::<Vec<_>>();

        info!(
            watcher = name,
            subscriptions = subscriptions.len(),
            "Watcher started"
        );

        Self {
            shared,
            debouncer,
            subscriptions,
        }
    }

    /// Run the initial load and publish its result.
    pub async fn load(&self) -> Result<Arc<R::Output>, FetchError> {
        let value = self.shared.refresher.load().await?;
        self.shared.state.send_modify(|state| {
            state.value = Some(Arc::clone(&value));
            state.last_error = None;
        });
        Ok(value)
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<WatchState<R::Output>> {
        self.shared.state.subscribe()
    }

    /// Latest published state.
    pub fn state(&self) -> WatchState<R::Output> {
        self.shared.state.borrow().clone()
    }

    pub fn current(&self) -> Option<Arc<R::Output>> {
        self.shared.state.borrow().value.clone()
    }

    pub fn refresher(&self) -> &R {
        &self.shared.refresher
    }

    /// Unsubscribe and cancel the scheduled refresh. Idempotent.
    pub fn shutdown(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.debouncer.cancel();
        mutex_lock(&self.shared.pending, SOURCE, "shutdown").take();
    }

    pub fn is_active(&self) -> bool {
        self.subscriptions.iter().any(Subscription::is_active)
    }
}

impl<R: Refresh> Drop for Watcher<R> {
    fn drop(&mut self) {
        self.shutdown();
        debug!(watcher = self.shared.refresher.name(), "Watcher stopped");
    }
}
