//! Keyed work queue with per-key serialization.
//!
//! Items are `(key, route)` pairs. A key is handed to at most one worker at
//! a time together with every route pending for it, so two reconciliations
//! of the same resource never overlap. Routes added while their key is being
//! processed are held back until the worker calls [`WorkQueue::done`].

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// First delay of the error backoff.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Longest delay of the error backoff.
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Delay before the `attempt`-th retry of a failing item (1-based).
pub fn backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    BASE_DELAY.saturating_mul(1 << exponent).min(MAX_DELAY)
}

pub struct WorkQueue<K, R> {
    state: Mutex<State<K, R>>,
    changed: Condvar,
    max_retries: u32,
}

struct State<K, R> {
    /// Keys ready to hand out, in arrival order.
    ready: VecDeque<K>,
    /// Routes waiting per key. A key present here and not processing is in `ready`.
    pending: HashMap<K, BTreeSet<R>>,
    processing: HashSet<K>,
    delayed: BinaryHeap<Reverse<Delayed<K, R>>>,
    failures: HashMap<(K, R), u32>,
    sequence: u64,
    shutting_down: bool,
}

struct Delayed<K, R> {
    due: Instant,
    sequence: u64,
    key: K,
    route: R,
}

impl<K, R> PartialEq for Delayed<K, R> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl<K, R> Eq for Delayed<K, R> {}

impl<K, R> PartialOrd for Delayed<K, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, R> Ord for Delayed<K, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.sequence).cmp(&(other.due, other.sequence))
    }
}

impl<K, R> State<K, R>
where
    K: Clone + Eq + Hash,
    R: Clone + Ord + Hash,
{
    fn insert(&mut self, key: K, route: R) -> bool {
        let newly_pending = !self.pending.contains_key(&key);
        self.pending.entry(key.clone()).or_default().insert(route);
        if newly_pending && !self.processing.contains(&key) {
            self.ready.push_back(key);
            return true;
        }
        false
    }

    /// Moves due delayed items into the ready set. Returns the next due time.
    fn promote(&mut self, now: Instant) -> Option<Instant> {
        while let Some(Reverse(next)) = self.delayed.peek() {
            if next.due > now {
                return Some(next.due);
            }
            if let Some(Reverse(item)) = self.delayed.pop() {
                self.insert(item.key, item.route);
            }
        }
        None
    }

    /// Whether a key being processed already has routes waiting behind it.
    fn has_held_back(&self) -> bool {
        self.processing.iter().any(|k| self.pending.contains_key(k))
    }
}

impl<K, R> WorkQueue<K, R>
where
    K: Clone + Eq + Hash,
    R: Clone + Ord + Hash,
{
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                pending: HashMap::new(),
                processing: HashSet::new(),
                delayed: BinaryHeap::new(),
                failures: HashMap::new(),
                sequence: 0,
                shutting_down: false,
            }),
            changed: Condvar::new(),
            max_retries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a route for a key. Duplicates collapse while pending.
    pub fn add(&self, key: K, route: R) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        if state.insert(key, route) {
            self.changed.notify_one();
        }
    }

    /// Adds a route once `delay` has passed.
    pub fn add_after(&self, key: K, route: R, delay: Duration) {
        if delay.is_zero() {
            self.add(key, route);
            return;
        }
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.sequence += 1;
        let item = Delayed {
            due: Instant::now() + delay,
            sequence: state.sequence,
            key,
            route,
        };
        state.delayed.push(Reverse(item));
        // A sleeping worker may need to wake sooner than it planned.
        self.changed.notify_all();
    }

    /// Re-adds a failed route with exponential backoff.
    ///
    /// Returns `false` when the route exhausted its retries and was dropped.
    pub fn add_rate_limited(&self, key: K, route: R) -> bool {
        let attempt = {
            let mut state = self.lock();
            let failures = state
                .failures
                .entry((key.clone(), route.clone()))
                .or_insert(0);
            *failures += 1;
            let attempt = *failures;
            if attempt > self.max_retries {
                state.failures.remove(&(key, route));
                return false;
            }
            attempt
        };
        self.add_after(key, route, backoff(attempt));
        true
    }

    /// Resets the failure count of a route.
    pub fn forget(&self, key: &K, route: &R) {
        self.lock().failures.remove(&(key.clone(), route.clone()));
    }

    #[cfg(test)]
    pub fn failures(&self, key: &K, route: &R) -> u32 {
        self.lock()
            .failures
            .get(&(key.clone(), route.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Blocks until a key is ready and returns it with all its pending routes.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub fn get(&self) -> Option<(K, BTreeSet<R>)> {
        let mut state = self.lock();
        loop {
            let next_due = state.promote(Instant::now());
            if let Some(key) = state.ready.pop_front() {
                let routes = state.pending.remove(&key).unwrap_or_default();
                state.processing.insert(key.clone());
                return Some((key, routes));
            }
            if state.shutting_down && !state.has_held_back() {
                return None;
            }
            state = match next_due {
                Some(due) => {
                    let timeout = due.saturating_duration_since(Instant::now());
                    self.changed
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Marks a key as no longer processing, releasing routes held back for it.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.pending.contains_key(key) {
            state.ready.push_back(key.clone());
        }
        self.changed.notify_all();
    }

    /// Stops accepting work. Ready keys are still handed out; delayed ones are dropped.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        state.delayed.clear();
        self.changed.notify_all();
    }
}
