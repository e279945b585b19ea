//! The two deduplication designs.
//!
//! Comments are deduplicated against a local [`NotificationMarker`] stored
//! through [`MarkerStore`]. Deployment statuses are deduplicated by asking
//! GitHub for the deployment's latest status; see [`already_delivered`].

use crate::model::{DeploymentState, NotificationMarker, ResourceKey};
use crate::storage::StorageError;

use super::Route;

/// Persistence for markers with optimistic concurrency.
///
/// Writes are conditional on the caller's `resource_version`; a stale
/// version fails with [`StorageError::Conflict`] and nothing is written.
pub trait MarkerStore: Send + Sync {
    fn get_marker(&self, key: &ResourceKey) -> Result<Option<NotificationMarker>, StorageError>;

    /// Inserts a new marker and sets its first `resource_version`.
    fn create_marker(&self, marker: &mut NotificationMarker) -> Result<(), StorageError>;

    /// Replaces the stored marker if its version still matches, then bumps
    /// `marker.resource_version`.
    fn patch_marker(&self, marker: &mut NotificationMarker) -> Result<(), StorageError>;

    /// Deletes the marker owned by `owner_uid`. Returns whether one existed.
    fn delete_marker(&self, key: &ResourceKey, owner_uid: &str) -> Result<bool, StorageError>;
}

/// Whether the deployment's latest status already covers `desired`.
///
/// `success` and `inactive` close a deployment; a later sync creates a new
/// one. Otherwise only an identical latest state counts as delivered.
pub fn already_delivered(
    route: Route,
    latest: Option<DeploymentState>,
    desired: DeploymentState,
) -> bool {
    let Some(latest) = latest else {
        return false;
    };
    match route {
        Route::DeletionDeployment => latest == DeploymentState::Inactive,
        _ => matches!(latest, DeploymentState::Success | DeploymentState::Inactive) || latest == desired,
    }
}
