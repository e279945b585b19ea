//! Which `(previous, current)` transitions are notification-worthy.
//!
//! Pure boolean functions. They only gate enqueueing; reconciliation
//! re-reads the latest object anyway.

use crate::extract::Facts;
use crate::model::{HealthStatus, OperationPhase};

/// Health moved to a state people want to hear about.
pub fn health_changed(prev: &Facts, curr: &Facts) -> bool {
    prev.health != curr.health
        && matches!(curr.health, HealthStatus::Healthy | HealthStatus::Degraded)
}

/// The sync operation entered a reportable phase.
pub fn phase_changed(prev: &Facts, curr: &Facts) -> bool {
    prev.phase != curr.phase
        && matches!(
            curr.phase,
            OperationPhase::Running
                | OperationPhase::Succeeded
                | OperationPhase::Failed
                | OperationPhase::Error
        )
}

/// Deletion was requested, or every managed resource went missing.
pub fn deletion_started(prev: &Facts, curr: &Facts) -> bool {
    (!prev.deletion_requested && curr.deletion_requested)
        || (prev.health != HealthStatus::Missing && curr.health == HealthStatus::Missing)
}

/// Anything the marker tracks changed.
pub fn state_changed(prev: &Facts, curr: &Facts) -> bool {
    prev.health != curr.health || (prev.phase != curr.phase && curr.phase != OperationPhase::None)
}
