//! Core data model for the notifier.
//!
//! The watched `Application` object, the notification states derived from
//! it, the persisted marker that deduplicates them, the payloads composed
//! for delivery, and the events recorded along the way.

mod application;
mod event;
mod marker;
mod payload;
mod state;

pub use application::{
    Application, ApplicationSource, ApplicationSpec, ApplicationStatus, HealthInfo, HealthStatus,
    ObjectMeta, Operation, OperationPhase, OperationState, ResourceKey, ResourceResult,
    ResourceStatus, Summary, SyncInfo, SyncOperation, SyncResult, SyncStatus,
};
pub use event::{Event, EventReason, EventType};
pub use marker::{NotificationMarker, SubMachine};
pub use payload::{
    Comment, DeploymentState, DeploymentStatus, DeploymentStatusPayload, NotificationId, Payload,
};
pub use state::{NotificationState, StateKind};
