//! Turning a stream of application changes into reconciliations.
//!
//! The controller keeps the latest object per key, enqueues the routes whose
//! predicates fire on each update, and runs them on a pool of worker threads.
//! Reconciliations always read the cached object, never the one that caused
//! the enqueue.

mod cache;
mod queue;
mod watch;

use std::io::Read;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn};

use crate::cancel::Cancellation;
use crate::extract::Facts;
use crate::model::{Application, ResourceKey};
use crate::notify::{Notifier, Outcome, ReconcileError, Route};

use cache::ObjectCache;
use queue::WorkQueue;
use watch::for_each_observed;

pub use watch::{Observed, WatchError};

/// Delay before retrying a route that lost a marker write race.
const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    /// Deadline for one reconciliation, including its external calls.
    pub reconcile_timeout: Duration,
    /// Error retries per route before it is dropped.
    pub max_retries: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            reconcile_timeout: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

pub struct Controller {
    notifier: Notifier,
    cache: ObjectCache,
    queue: WorkQueue<ResourceKey, Route>,
    root: Cancellation,
    reconcile_timeout: Duration,
}

impl Controller {
    pub fn new(notifier: Notifier, settings: ControllerSettings) -> Self {
        Self {
            notifier,
            cache: ObjectCache::new(),
            queue: WorkQueue::new(settings.max_retries),
            root: Cancellation::new(),
            reconcile_timeout: settings.reconcile_timeout,
        }
    }

    /// Reads changes from `reader` until EOF while `workers` threads reconcile.
    ///
    /// Returns after the queue has drained. Delayed requeues still waiting at
    /// EOF are dropped. A broken stream also cancels reconciliations in flight.
    pub fn run<R: Read>(&self, reader: R, workers: usize) -> Result<(), WatchError> {
        info!(workers, "controller started");
        let result = thread::scope(|scope| {
            for _ in 0..workers.max(1) {
                scope.spawn(|| self.work());
            }
            let result = for_each_observed(reader, |observed| self.observe(observed));
            if let Err(e) = &result {
                error!("watch stream failed: {e}");
                self.root.cancel();
            }
            self.queue.shut_down();
            result
        });
        info!("controller stopped");
        result
    }

    /// Applies one change to the cache and enqueues the routes it triggers.
    pub fn observe(&self, observed: Observed) {
        match observed {
            Observed::Upsert(app) => {
                let key = app.key();
                let curr = Facts::of(&app);
                // The first sighting of an object only seeds the cache.
                let Some(prev) = self.cache.insert(app) else {
                    debug!(app = %key, "observed new application");
                    return;
                };
                let prev = Facts::of(&prev);
                for route in Route::ALL {
                    if route.fires(&prev, &curr) {
                        debug!(app = %key, %route, "enqueue");
                        self.queue.add(key.clone(), route);
                    }
                }
            }
            Observed::Deleted(app) => self.deleted(&app),
        }
    }

    fn deleted(&self, app: &Application) {
        let key = app.key();
        self.cache.remove(&key);
        match self.notifier.forget(app) {
            Ok(true) => info!(app = %key, "removed notification marker"),
            Ok(false) => debug!(app = %key, "no notification marker to remove"),
            Err(e) => warn!(app = %key, "failed to remove notification marker: {e}"),
        }
    }

    fn work(&self) {
        while let Some((key, routes)) = self.queue.get() {
            self.process(&key, routes);
            self.queue.done(&key);
        }
    }

    fn process(&self, key: &ResourceKey, routes: impl IntoIterator<Item = Route>) {
        let Some(app) = self.cache.get(key) else {
            debug!(app = %key, "application is gone, skipping");
            for route in routes {
                self.queue.forget(key, &route);
            }
            return;
        };
        for route in routes {
            let span = info_span!("reconcile", app = %key, %route);
            let _enter = span.enter();
            let cancel = self.root.child(self.reconcile_timeout);
            match self.notifier.reconcile(route, &app, &cancel) {
                Ok(Outcome::Done) => self.queue.forget(key, &route),
                Ok(Outcome::RequeueAfter(delay)) => {
                    self.queue.forget(key, &route);
                    debug!(delay_secs = delay.as_secs(), "requeue");
                    self.queue.add_after(key.clone(), route, delay);
                }
                Err(e) => self.retry_failed(key, route, &e),
            }
        }
    }

    /// Requeues a failed route. Lost write races are retried without
    /// spending the error budget.
    fn retry_failed(&self, key: &ResourceKey, route: Route, e: &ReconcileError) {
        if let ReconcileError::Conflict(_) = e {
            debug!("{e}, retrying");
            self.queue.add_after(key.clone(), route, CONFLICT_RETRY_DELAY);
        } else if self.queue.add_rate_limited(key.clone(), route) {
            warn!("reconcile failed, will retry: {e}");
        } else {
            error!("reconcile failed, giving up: {e}");
        }
    }
}
