//! The delivery client seam.

use std::fmt;

use crate::cancel::Cancellation;
use crate::model::DeploymentStatus;

use super::{Deployment, Repository};

/// Errors returned by a [`DeliveryClient`].
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The addressed object does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("cancelled before completion")]
    Cancelled,

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("failed to run gh: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A pull request that contains a given commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    /// Paths changed by the pull request.
    pub files: Vec<String>,
}

/// Where a comment is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentTarget {
    PullRequest(u64),
    Commit(String),
}

impl fmt::Display for CommentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullRequest(number) => write!(f, "#{number}"),
            Self::Commit(sha) => write!(f, "commit {sha}"),
        }
    }
}

/// Outbound calls to GitHub.
///
/// Every call takes a cancellation token and must return
/// [`DeliveryError::Cancelled`] promptly once it fires.
pub trait DeliveryClient: Send + Sync {
    /// Pull requests associated with `revision`, with their changed files.
    fn list_pull_requests(
        &self,
        repository: &Repository,
        revision: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, DeliveryError>;

    fn create_comment(
        &self,
        repository: &Repository,
        target: &CommentTarget,
        body: &str,
        cancel: &Cancellation,
    ) -> Result<(), DeliveryError>;

    fn create_deployment_status(
        &self,
        deployment: &Deployment,
        status: &DeploymentStatus,
        cancel: &Cancellation,
    ) -> Result<(), DeliveryError>;

    /// The newest status of `deployment`, or `None` if it has none.
    ///
    /// A deployment that does not exist is [`DeliveryError::NotFound`].
    fn find_latest_deployment_status(
        &self,
        deployment: &Deployment,
        cancel: &Cancellation,
    ) -> Result<Option<DeploymentStatus>, DeliveryError>;
}
