//! Trailing-edge debounce for event-driven refreshes.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::debounce";

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Collapses bursts of triggers into one run of `action`.
///
/// Every trigger cancels the pending timer and starts a new one; the action
/// runs once the window passes without another trigger. An action that has
/// already started is never cancelled by a later trigger.
pub struct Debouncer {
    name: &'static str,
    window: Duration,
    action: Action,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer whose timers run on `runtime`.
    pub fn new<F, Fut>(name: &'static str, runtime: Handle, window: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(action()) });
        Self {
            name,
            window,
            action,
            runtime,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule the action, replacing any pending schedule.
    pub fn trigger(&self) {
        let mut pending = mutex_lock(&self.pending, SOURCE, "trigger");
        if let Some(previous) = pending.take()
            && !previous.is_finished()
        {
            previous.abort();
            debug!(debouncer = self.name, "Pending refresh rescheduled");
        }

        let action = Arc::clone(&self.action);
        let runtime = self.runtime.clone();
        let window = self.window;
        let name = self.name;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            debug!(debouncer = name, "Debounce window elapsed");
            // Detach so a later trigger cannot abort a refresh in progress.
            runtime.spawn(action());
        }));
    }

    /// Drop the pending schedule, if any.
    pub fn cancel(&self) {
        if let Some(previous) = mutex_lock(&self.pending, SOURCE, "cancel").take() {
            previous.abort();
        }
    }

    /// Whether a timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        mutex_lock(&self.pending, SOURCE, "is_pending")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
