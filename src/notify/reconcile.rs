//! Reconciling one route for one application.
//!
//! Every call reads the application as it is now and decides from that
//! alone what, if anything, still has to be delivered. Running it twice on
//! the same object delivers nothing the second time.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::extract;
use crate::github::{CommentTarget, DeliveryClient, DeliveryError};
use crate::model::{
    Application, Comment, DeploymentStatusPayload, Event, EventReason, EventType,
    NotificationMarker, NotificationState, Payload, ResourceKey,
};
use crate::storage::StorageError;

use super::compose::compose;
use super::dedup::{MarkerStore, already_delivered};
use super::pulls;
use super::recorder::Recorder;
use super::retry::{Clock, RetryDecision, RetryPolicy};
use super::Route;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The marker changed underneath us. Retrying re-reads it.
    #[error("notification marker for {0} was modified concurrently")]
    Conflict(ResourceKey),

    #[error(transparent)]
    Storage(StorageError),

    #[error("{route} delivery failed: {source}")]
    Delivery {
        route: Route,
        #[source]
        source: DeliveryError,
    },
}

impl From<StorageError> for ReconcileError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict(key) | StorageError::AlreadyExists(key) => Self::Conflict(key),
            other => Self::Storage(other),
        }
    }
}

/// What the work queue should do with the item next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    RequeueAfter(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct NotifierSettings {
    pub retry: RetryPolicy,
    /// Base URL of the Argo CD UI, for links.
    pub argocd_url: Option<String>,
    /// Comment on the commit when no pull request relates to it.
    pub create_commit_comment: bool,
}

pub struct Notifier {
    store: Arc<dyn MarkerStore>,
    recorder: Arc<dyn Recorder>,
    client: Arc<dyn DeliveryClient>,
    clock: Arc<dyn Clock>,
    settings: NotifierSettings,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn MarkerStore>,
        recorder: Arc<dyn Recorder>,
        client: Arc<dyn DeliveryClient>,
        clock: Arc<dyn Clock>,
        settings: NotifierSettings,
    ) -> Self {
        Self {
            store,
            recorder,
            client,
            clock,
            settings,
        }
    }

    pub fn reconcile(
        &self,
        route: Route,
        app: &Application,
        cancel: &Cancellation,
    ) -> Result<Outcome, ReconcileError> {
        match route {
            Route::TrackState => {
                self.track_state(app)?;
                Ok(Outcome::Done)
            }
            Route::PhaseComment | Route::HealthComment => self.notify_comments(route, app, cancel),
            Route::PhaseDeployment | Route::HealthDeployment | Route::DeletionDeployment => {
                self.notify_deployment(route, app, cancel)
            }
        }
    }

    /// Forgets the marker and events of a deleted application.
    ///
    /// Returns whether a marker owned by `app` was removed.
    pub fn forget(&self, app: &Application) -> Result<bool, StorageError> {
        let key = app.key();
        self.recorder.forget(&key);
        self.store.delete_marker(&key, &app.metadata.uid)
    }

    // ── Marker tracking ──

    fn track_state(&self, app: &Application) -> Result<(), ReconcileError> {
        if is_deleting(app) {
            return Ok(());
        }
        let mut marker = self.load_marker(app)?;
        let mut changed = false;
        if let Some(state) = NotificationState::from_phase(extract::operation_phase(app)) {
            changed |= marker.observe(state);
        }
        if let Some(state) = NotificationState::from_health(app.status.health.status) {
            changed |= marker.observe(state);
        }
        if changed {
            self.save(&mut marker)?;
            debug!(state = ?marker.current_state, "tracked state");
        }
        Ok(())
    }

    /// Loads the marker for `app`, creating it on first sight.
    ///
    /// A marker left behind by an earlier incarnation of the application
    /// (different owner UID) is discarded.
    fn load_marker(&self, app: &Application) -> Result<NotificationMarker, ReconcileError> {
        let key = app.key();
        match self.store.get_marker(&key)? {
            Some(marker) if marker.owner_uid == app.metadata.uid => Ok(marker),
            Some(orphan) => {
                info!(owner = %orphan.owner_uid, "replacing orphaned notification marker");
                self.store.delete_marker(&key, &orphan.owner_uid)?;
                self.create_marker(app)
            }
            None => self.create_marker(app),
        }
    }

    fn create_marker(&self, app: &Application) -> Result<NotificationMarker, ReconcileError> {
        let mut marker = NotificationMarker::new(app.key(), &app.metadata.uid, self.clock.now());
        self.store.create_marker(&mut marker)?;
        Ok(marker)
    }

    fn save(&self, marker: &mut NotificationMarker) -> Result<(), ReconcileError> {
        marker.updated_at = self.clock.now();
        self.store.patch_marker(marker)?;
        Ok(())
    }

    // ── Comments ──

    fn notify_comments(
        &self,
        route: Route,
        app: &Application,
        cancel: &Cancellation,
    ) -> Result<Outcome, ReconcileError> {
        if is_deleting(app) {
            return Ok(Outcome::Done);
        }
        let state = match route {
            Route::PhaseComment => NotificationState::from_phase(extract::operation_phase(app)),
            _ => NotificationState::from_health(app.status.health.status),
        };
        let Some(state) = state else {
            return Ok(Outcome::Done);
        };

        let mut marker = self.load_marker(app)?;
        let observed = marker.observe(state);
        if !marker.should_notify(state) {
            debug!(%state, "already notified");
            if observed {
                self.save(&mut marker)?;
            }
            return Ok(Outcome::Done);
        }

        let Some(payloads) = compose(route, app, self.settings.argocd_url.as_deref()) else {
            debug!(%state, "no comment for this state");
            if observed {
                self.save(&mut marker)?;
            }
            return Ok(Outcome::Done);
        };

        let mut first_error = None;
        for payload in &payloads {
            let Payload::Comment(comment) = payload else {
                continue;
            };
            if let Err(e) = self.deliver_comment(app, comment, cancel) {
                first_error.get_or_insert(e);
            }
        }
        // The marker only advances once everything went out.
        if let Some(source) = first_error {
            return Err(ReconcileError::Delivery { route, source });
        }

        marker.mark_notified(state);
        self.save(&mut marker)?;
        info!(%state, comments = payloads.len(), "notified");
        Ok(Outcome::Done)
    }

    fn deliver_comment(
        &self,
        app: &Application,
        comment: &Comment,
        cancel: &Cancellation,
    ) -> Result<(), DeliveryError> {
        match self.post_comment(app, comment, cancel) {
            Ok(targets) if targets.is_empty() => {
                info!(
                    repository = %comment.repository,
                    revision = %comment.revision,
                    "no pull request related to the revision"
                );
                Ok(())
            }
            Ok(targets) => {
                let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
                self.emit(
                    self.event(
                        app,
                        EventType::Normal,
                        EventReason::CreatedComment,
                        format!(
                            "created comment on {} {} for {}",
                            comment.repository,
                            targets.join(", "),
                            comment.revision
                        ),
                    )
                    .with_notification(&comment.id),
                );
                Ok(())
            }
            Err(e) => {
                self.emit(
                    self.event(
                        app,
                        EventType::Warning,
                        EventReason::CreateCommentError,
                        format!(
                            "unable to comment on {} for {}: {e}",
                            comment.repository, comment.revision
                        ),
                    )
                    .with_notification(&comment.id),
                );
                Err(e)
            }
        }
    }

    /// Posts `comment` on every related pull request. Returns where it landed.
    fn post_comment(
        &self,
        app: &Application,
        comment: &Comment,
        cancel: &Cancellation,
    ) -> Result<Vec<CommentTarget>, DeliveryError> {
        let all = self
            .client
            .list_pull_requests(&comment.repository, &comment.revision, cancel)?;
        let manifest_paths = pulls::manifest_generate_paths(app);
        let related = pulls::related(&all, &comment.source_path, &manifest_paths);

        if related.is_empty() {
            if !self.settings.create_commit_comment {
                return Ok(Vec::new());
            }
            let target = CommentTarget::Commit(comment.revision.clone());
            self.client
                .create_comment(&comment.repository, &target, &comment.body, cancel)?;
            return Ok(vec![target]);
        }

        let mut posted = Vec::new();
        let mut first_error = None;
        for pull in related {
            let target = CommentTarget::PullRequest(pull.number);
            match self
                .client
                .create_comment(&comment.repository, &target, &comment.body, cancel)
            {
                Ok(()) => posted.push(target),
                Err(e) => {
                    warn!(pull = pull.number, error = %e, "unable to comment on pull request");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(posted),
        }
    }

    // ── Deployment statuses ──

    fn notify_deployment(
        &self,
        route: Route,
        app: &Application,
        cancel: &Cancellation,
    ) -> Result<Outcome, ReconcileError> {
        if route != Route::DeletionDeployment && is_deleting(app) {
            return Ok(Outcome::Done);
        }
        let Some(payloads) = compose(route, app, self.settings.argocd_url.as_deref()) else {
            debug!("no deployment status for this state");
            return Ok(Outcome::Done);
        };
        let Some(Payload::DeploymentStatus(payload)) = payloads.into_iter().next() else {
            return Ok(Outcome::Done);
        };
        let state = payload.status.state;

        let latest = match self
            .client
            .find_latest_deployment_status(&payload.deployment, cancel)
        {
            Ok(latest) => latest,
            Err(e) if e.is_not_found() => return Ok(self.deployment_not_found(app, &payload)),
            Err(source) => {
                self.emit(
                    self.event(
                        app,
                        EventType::Warning,
                        EventReason::CreateDeploymentStatusError,
                        format!("unable to read status of {}: {source}", payload.deployment),
                    )
                    .with_notification(&payload.id),
                );
                return Err(ReconcileError::Delivery { route, source });
            }
        };

        if already_delivered(route, latest.as_ref().map(|s| s.state), state) {
            self.emit(
                self.event(
                    app,
                    EventType::Normal,
                    EventReason::DeploymentAlreadyUpToDate,
                    format!("deployment {} is already {}", payload.deployment, latest.map_or(state, |s| s.state)),
                )
                .with_notification(&payload.id),
            );
            return Ok(Outcome::Done);
        }

        match self
            .client
            .create_deployment_status(&payload.deployment, &payload.status, cancel)
        {
            Ok(()) => {
                self.emit(
                    self.event(
                        app,
                        EventType::Normal,
                        EventReason::CreatedDeploymentStatus,
                        format!("created deployment status {state} on {}", payload.deployment),
                    )
                    .with_notification(&payload.id),
                );
                Ok(Outcome::Done)
            }
            Err(e) if e.is_not_found() => Ok(self.deployment_not_found(app, &payload)),
            Err(source) => {
                self.emit(
                    self.event(
                        app,
                        EventType::Warning,
                        EventReason::CreateDeploymentStatusError,
                        format!(
                            "unable to create deployment status {state} on {}: {source}",
                            payload.deployment
                        ),
                    )
                    .with_notification(&payload.id),
                );
                Err(ReconcileError::Delivery { route, source })
            }
        }
    }

    /// Retries at a fixed interval until the sync operation is too old.
    fn deployment_not_found(&self, app: &Application, payload: &DeploymentStatusPayload) -> Outcome {
        let last_operation_at = extract::last_operation_at(app);
        match self
            .settings
            .retry
            .decide(last_operation_at, self.clock.now())
        {
            RetryDecision::RetryAfter(after) => {
                self.emit(
                    self.event(
                        app,
                        EventType::Normal,
                        EventReason::DeploymentNotFound,
                        format!(
                            "deployment {} not found, retry after {}s",
                            payload.deployment,
                            after.as_secs()
                        ),
                    )
                    .with_notification(&payload.id),
                );
                Outcome::RequeueAfter(after)
            }
            RetryDecision::Expired => {
                self.emit(
                    self.event(
                        app,
                        EventType::Warning,
                        EventReason::DeploymentNotFoundRetryTimeout,
                        format!(
                            "deployment {} not found, retry timed out after {}s",
                            payload.deployment,
                            self.settings.retry.timeout.as_secs()
                        ),
                    )
                    .with_notification(&payload.id),
                );
                Outcome::Done
            }
        }
    }

    // ── Events ──

    fn event(
        &self,
        app: &Application,
        event_type: EventType,
        reason: EventReason,
        message: String,
    ) -> Event {
        Event::new(app.key(), event_type, reason, message, self.clock.now())
    }

    fn emit(&self, event: Event) {
        match event.event_type {
            EventType::Normal => info!(reason = %event.reason, "{}", event.message),
            EventType::Warning => warn!(reason = %event.reason, "{}", event.message),
        }
        self.recorder.record(event);
    }
}

fn is_deleting(app: &Application) -> bool {
    app.metadata.deletion_timestamp.is_some()
}
