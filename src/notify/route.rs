//! The closed set of notification routes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extract::Facts;

use super::predicate;

/// One family of notification delivered on one channel.
///
/// Declaration order is the order routes run in when several are pending
/// for the same application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    TrackState,
    PhaseComment,
    HealthComment,
    PhaseDeployment,
    HealthDeployment,
    DeletionDeployment,
}

impl Route {
    pub const ALL: [Self; 6] = [
        Self::TrackState,
        Self::PhaseComment,
        Self::HealthComment,
        Self::PhaseDeployment,
        Self::HealthDeployment,
        Self::DeletionDeployment,
    ];

    /// Whether this route should run for the transition `prev -> curr`.
    pub fn fires(self, prev: &Facts, curr: &Facts) -> bool {
        let has_deployment = curr.deployment.is_some();
        match self {
            Self::TrackState => predicate::state_changed(prev, curr),
            Self::PhaseComment => predicate::phase_changed(prev, curr),
            Self::HealthComment => predicate::health_changed(prev, curr),
            Self::PhaseDeployment => has_deployment && predicate::phase_changed(prev, curr),
            Self::HealthDeployment => has_deployment && predicate::health_changed(prev, curr),
            Self::DeletionDeployment => has_deployment && predicate::deletion_started(prev, curr),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrackState => "track-state",
            Self::PhaseComment => "phase-comment",
            Self::HealthComment => "health-comment",
            Self::PhaseDeployment => "phase-deployment",
            Self::HealthDeployment => "health-deployment",
            Self::DeletionDeployment => "deletion-deployment",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
