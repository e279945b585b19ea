//! The notification engine.
//!
//! For each [`Route`], a predicate decides whether a transition is worth
//! reconciling, the composer builds payloads from the current object, and
//! the [`Notifier`] delivers them at most once per state (comments) or per
//! deployment status, retrying a missing deployment for a bounded window.

mod compose;
mod dedup;
mod predicate;
mod pulls;
mod reconcile;
mod recorder;
mod retry;
mod route;

pub use dedup::MarkerStore;
pub use reconcile::{Notifier, NotifierSettings, Outcome, ReconcileError};
pub use recorder::Recorder;
pub use retry::{RetryPolicy, SystemClock};
pub use route::Route;

#[cfg(test)]
pub use recorder::testing::MemoryRecorder;
#[cfg(test)]
pub use retry::testing::ManualClock;
