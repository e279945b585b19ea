//! Bounded retry while a deployment reference is not resolvable yet.
//!
//! CI usually creates the deployment before Argo CD starts syncing, but not
//! always. While the operation is recent, a missing deployment is retried at
//! a fixed interval; once `lastOperationAt + timeout` has passed, it is
//! given up on.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Expired,
}

impl RetryPolicy {
    /// The instant after which no more retries happen.
    ///
    /// Without a last operation there is nothing to wait for.
    pub fn deadline(&self, last_operation_at: Option<Timestamp>) -> Option<Timestamp> {
        let last = last_operation_at?;
        let timeout = SignedDuration::try_from(self.timeout).unwrap_or(SignedDuration::MAX);
        Some(last.checked_add(timeout).unwrap_or(Timestamp::MAX))
    }

    pub fn decide(&self, last_operation_at: Option<Timestamp>, now: Timestamp) -> RetryDecision {
        match self.deadline(last_operation_at) {
            Some(deadline) if now < deadline => RetryDecision::RetryAfter(self.interval),
            _ => RetryDecision::Expired,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock(Mutex<Timestamp>);

    impl ManualClock {
        pub fn new(now: Timestamp) -> Self {
            Self(Mutex::new(now))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = now.checked_add(SignedDuration::try_from(by).unwrap()).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            *self.0.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn retries_inside_the_window() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(Some(ts("2024-05-01T10:00:00Z")), ts("2024-05-01T10:09:59Z"));
        assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_secs(30)));
    }

    #[test]
    fn expires_at_the_deadline() {
        let policy = RetryPolicy::default();
        let last = Some(ts("2024-05-01T10:00:00Z"));
        assert_eq!(policy.decide(last, ts("2024-05-01T10:10:00Z")), RetryDecision::Expired);
        assert_eq!(policy.decide(last, ts("2024-05-01T10:11:00Z")), RetryDecision::Expired);
    }

    #[test]
    fn no_operation_expires_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(None, ts("2024-05-01T10:00:00Z")), RetryDecision::Expired);
    }

    #[test]
    fn number_of_retries_is_bounded() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(100),
        };
        let clock = testing::ManualClock::new(ts("2024-05-01T10:00:00Z"));
        let last = Some(clock.now());
        let mut retries = 0;
        while let RetryDecision::RetryAfter(after) = policy.decide(last, clock.now()) {
            retries += 1;
            clock.advance(after);
        }
        // ceil(100 / 30)
        assert_eq!(retries, 4);
    }
}
