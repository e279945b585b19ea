//! Notification states derived from observed status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{HealthStatus, OperationPhase};

/// Which sub-machine a state belongs to.
///
/// Phase and health are tracked independently so a health notification never
/// suppresses a phase one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateKind {
    Phase,
    Health,
}

/// A notification-relevant state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationState {
    Syncing,
    Synced,
    SyncFailed,
    Progressing,
    Healthy,
    Degraded,
}

impl NotificationState {
    /// Maps an operation phase onto the phase sub-machine.
    ///
    /// Terminating and the empty phase carry no notification state.
    pub fn from_phase(phase: OperationPhase) -> Option<Self> {
        match phase {
            OperationPhase::Running => Some(Self::Syncing),
            OperationPhase::Succeeded => Some(Self::Synced),
            OperationPhase::Failed | OperationPhase::Error => Some(Self::SyncFailed),
            OperationPhase::None | OperationPhase::Terminating => None,
        }
    }

    /// Maps a health status onto the health sub-machine.
    pub fn from_health(health: HealthStatus) -> Option<Self> {
        match health {
            HealthStatus::Progressing => Some(Self::Progressing),
            HealthStatus::Healthy => Some(Self::Healthy),
            HealthStatus::Degraded => Some(Self::Degraded),
            HealthStatus::Unknown | HealthStatus::Suspended | HealthStatus::Missing => None,
        }
    }

    pub fn kind(self) -> StateKind {
        match self {
            Self::Syncing | Self::Synced | Self::SyncFailed => StateKind::Phase,
            Self::Progressing | Self::Healthy | Self::Degraded => StateKind::Health,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syncing => "Syncing",
            Self::Synced => "Synced",
            Self::SyncFailed => "SyncFailed",
            Self::Progressing => "Progressing",
            Self::Healthy => "Healthy",
            Self::Degraded => "Degraded",
        }
    }
}

impl fmt::Display for NotificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Syncing" => Ok(Self::Syncing),
            "Synced" => Ok(Self::Synced),
            "SyncFailed" => Ok(Self::SyncFailed),
            "Progressing" => Ok(Self::Progressing),
            "Healthy" => Ok(Self::Healthy),
            "Degraded" => Ok(Self::Degraded),
            other => Err(format!("unknown notification state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_and_error_phases_share_a_state() {
        assert_eq!(
            NotificationState::from_phase(OperationPhase::Failed),
            Some(NotificationState::SyncFailed)
        );
        assert_eq!(
            NotificationState::from_phase(OperationPhase::Error),
            Some(NotificationState::SyncFailed)
        );
        assert_eq!(NotificationState::from_phase(OperationPhase::None), None);
    }

    #[test]
    fn missing_health_has_no_state() {
        assert_eq!(NotificationState::from_health(HealthStatus::Missing), None);
    }

    #[test]
    fn parses_its_own_names() {
        for state in [
            NotificationState::Syncing,
            NotificationState::Synced,
            NotificationState::SyncFailed,
            NotificationState::Progressing,
            NotificationState::Healthy,
            NotificationState::Degraded,
        ] {
            assert_eq!(state.as_str().parse::<NotificationState>(), Ok(state));
        }
        assert!("Running".parse::<NotificationState>().is_err());
    }
}
