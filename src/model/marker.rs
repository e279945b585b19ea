//! Persisted dedup record for one watched application.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::{NotificationState, ResourceKey, StateKind};

/// What one sub-machine last saw and last announced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMachine {
    pub observed: Option<NotificationState>,
    pub notified: Option<NotificationState>,
}

/// Companion record for an application, keyed by the same `namespace/name`.
///
/// `owner_uid` ties the marker to one incarnation of the application; a
/// marker whose owner no longer matches is an orphan. `resource_version`
/// increments on every successful write and guards against lost updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMarker {
    pub key: ResourceKey,
    pub owner_uid: String,
    /// The most recently observed state across both sub-machines.
    pub current_state: Option<NotificationState>,
    /// The most recently announced state across both sub-machines.
    pub last_notified_state: Option<NotificationState>,
    pub phase: SubMachine,
    pub health: SubMachine,
    pub resource_version: i64,
    pub updated_at: Timestamp,
}

impl NotificationMarker {
    /// A marker that has observed nothing. It exists in storage only once
    /// created, which assigns the first `resource_version`.
    pub fn new(key: ResourceKey, owner_uid: impl Into<String>, now: Timestamp) -> Self {
        Self {
            key,
            owner_uid: owner_uid.into(),
            current_state: None,
            last_notified_state: None,
            phase: SubMachine::default(),
            health: SubMachine::default(),
            resource_version: 0,
            updated_at: now,
        }
    }

    pub fn sub_machine(&self, kind: StateKind) -> &SubMachine {
        match kind {
            StateKind::Phase => &self.phase,
            StateKind::Health => &self.health,
        }
    }

    fn sub_machine_mut(&mut self, kind: StateKind) -> &mut SubMachine {
        match kind {
            StateKind::Phase => &mut self.phase,
            StateKind::Health => &mut self.health,
        }
    }

    /// Records `state` as observed. Returns whether anything changed.
    ///
    /// A new sync operation starts a fresh health cycle, so entering
    /// `Syncing` forgets which health state was last announced.
    pub fn observe(&mut self, state: NotificationState) -> bool {
        let sub = self.sub_machine_mut(state.kind());
        if sub.observed == Some(state) {
            return false;
        }
        sub.observed = Some(state);
        self.current_state = Some(state);
        if state == NotificationState::Syncing {
            self.health.notified = None;
        }
        true
    }

    /// True while `state` has not been announced by its sub-machine.
    pub fn should_notify(&self, state: NotificationState) -> bool {
        self.sub_machine(state.kind()).notified != Some(state)
    }

    pub fn mark_notified(&mut self, state: NotificationState) {
        self.sub_machine_mut(state.kind()).notified = Some(state);
        self.last_notified_state = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker() -> NotificationMarker {
        NotificationMarker::new(ResourceKey::new("argocd", "app1"), "uid-1", Timestamp::UNIX_EPOCH)
    }

    #[test]
    fn observing_same_state_twice_is_a_no_op() {
        let mut m = marker();
        assert!(m.observe(NotificationState::Healthy));
        assert!(!m.observe(NotificationState::Healthy));
        assert_eq!(m.current_state, Some(NotificationState::Healthy));
    }

    #[test]
    fn notify_once_per_state() {
        let mut m = marker();
        m.observe(NotificationState::Healthy);
        assert!(m.should_notify(NotificationState::Healthy));
        m.mark_notified(NotificationState::Healthy);
        assert!(!m.should_notify(NotificationState::Healthy));
        assert_eq!(m.last_notified_state, Some(NotificationState::Healthy));
    }

    #[test]
    fn sub_machines_are_independent() {
        let mut m = marker();
        m.mark_notified(NotificationState::Healthy);
        m.observe(NotificationState::Synced);
        assert!(m.should_notify(NotificationState::Synced));
        assert!(!m.should_notify(NotificationState::Healthy));
    }

    #[test]
    fn new_sync_reopens_health() {
        let mut m = marker();
        m.mark_notified(NotificationState::Healthy);
        m.observe(NotificationState::Syncing);
        assert!(m.should_notify(NotificationState::Healthy));
        assert_eq!(m.last_notified_state, Some(NotificationState::Healthy));
    }
}
