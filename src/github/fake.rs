//! In-memory [`DeliveryClient`] for tests.
//!
//! Records every call and keeps deployment statuses so that
//! `find_latest_deployment_status` sees what was created.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cancel::Cancellation;
use crate::model::DeploymentStatus;

use super::{CommentTarget, Deployment, DeliveryClient, DeliveryError, PullRequest, Repository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub repository: String,
    pub target: CommentTarget,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct FakeClient {
    pulls: Mutex<HashMap<(String, String), Vec<PullRequest>>>,
    statuses: Mutex<HashMap<u64, Vec<DeploymentStatus>>>,
    missing: Mutex<HashSet<u64>>,
    comments: Mutex<Vec<PostedComment>>,
    lookups: Mutex<u32>,
    fail_writes: AtomicBool,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pull request containing `revision` in `repository` (`owner/name`).
    pub fn add_pull(&self, repository: &str, revision: &str, number: u64, files: &[&str]) {
        self.pulls
            .lock()
            .unwrap()
            .entry((repository.to_string(), revision.to_string()))
            .or_default()
            .push(PullRequest {
                number,
                files: files.iter().map(|f| (*f).to_string()).collect(),
            });
    }

    pub fn set_missing(&self, deployment_id: u64, missing: bool) {
        let mut set = self.missing.lock().unwrap();
        if missing {
            set.insert(deployment_id);
        } else {
            set.remove(&deployment_id);
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn comments(&self) -> Vec<PostedComment> {
        self.comments.lock().unwrap().clone()
    }

    pub fn statuses(&self, deployment_id: u64) -> Vec<DeploymentStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(&deployment_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn lookups(&self) -> u32 {
        *self.lookups.lock().unwrap()
    }

    fn check_write(&self) -> Result<(), DeliveryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(DeliveryError::Api("Internal Server Error (HTTP 500)".into()))
        } else {
            Ok(())
        }
    }
}

impl DeliveryClient for FakeClient {
    fn list_pull_requests(
        &self,
        repository: &Repository,
        revision: &str,
        _cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, DeliveryError> {
        Ok(self
            .pulls
            .lock()
            .unwrap()
            .get(&(repository.to_string(), revision.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn create_comment(
        &self,
        repository: &Repository,
        target: &CommentTarget,
        body: &str,
        _cancel: &Cancellation,
    ) -> Result<(), DeliveryError> {
        self.check_write()?;
        self.comments.lock().unwrap().push(PostedComment {
            repository: repository.to_string(),
            target: target.clone(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn create_deployment_status(
        &self,
        deployment: &Deployment,
        status: &DeploymentStatus,
        _cancel: &Cancellation,
    ) -> Result<(), DeliveryError> {
        if self.missing.lock().unwrap().contains(&deployment.id) {
            return Err(DeliveryError::NotFound(format!("{deployment}")));
        }
        self.check_write()?;
        self.statuses
            .lock()
            .unwrap()
            .entry(deployment.id)
            .or_default()
            .push(status.clone());
        Ok(())
    }

    fn find_latest_deployment_status(
        &self,
        deployment: &Deployment,
        _cancel: &Cancellation,
    ) -> Result<Option<DeploymentStatus>, DeliveryError> {
        *self.lookups.lock().unwrap() += 1;
        if self.missing.lock().unwrap().contains(&deployment.id) {
            return Err(DeliveryError::NotFound(format!("{deployment}")));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&deployment.id)
            .and_then(|s| s.last().cloned()))
    }
}
