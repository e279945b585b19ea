//! Operator-visible events about notification delivery.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{NotificationId, ResourceKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Why an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventReason {
    CreatedComment,
    CreateCommentError,
    CreatedDeploymentStatus,
    CreateDeploymentStatusError,
    DeploymentNotFound,
    DeploymentNotFoundRetryTimeout,
    DeploymentAlreadyUpToDate,
}

impl EventReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedComment => "CreatedComment",
            Self::CreateCommentError => "CreateCommentError",
            Self::CreatedDeploymentStatus => "CreatedDeploymentStatus",
            Self::CreateDeploymentStatusError => "CreateDeploymentStatusError",
            Self::DeploymentNotFound => "DeploymentNotFound",
            Self::DeploymentNotFoundRetryTimeout => "DeploymentNotFoundRetryTimeout",
            Self::DeploymentAlreadyUpToDate => "DeploymentAlreadyUpToDate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::CreatedComment,
            Self::CreateCommentError,
            Self::CreatedDeploymentStatus,
            Self::CreateDeploymentStatusError,
            Self::DeploymentNotFound,
            Self::DeploymentNotFoundRetryTimeout,
            Self::DeploymentAlreadyUpToDate,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
    }
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub key: ResourceKey,
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
    pub notification_id: Option<NotificationId>,
    pub recorded_at: Timestamp,
}

impl Event {
    pub fn new(
        key: ResourceKey,
        event_type: EventType,
        reason: EventReason,
        message: impl Into<String>,
        recorded_at: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            event_type,
            reason,
            message: message.into(),
            notification_id: None,
            recorded_at,
        }
    }

    #[must_use]
    pub fn with_notification(mut self, id: &NotificationId) -> Self {
        self.notification_id = Some(id.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_names_round_trip_through_parse() {
        assert_eq!(
            EventReason::parse("DeploymentNotFoundRetryTimeout"),
            Some(EventReason::DeploymentNotFoundRetryTimeout)
        );
        assert_eq!(EventReason::parse("Nope"), None);
    }
}
