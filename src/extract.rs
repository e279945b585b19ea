//! Reading normalized facts out of an `Application`.
//!
//! Everything here is a pure function of one object snapshot.

use jiff::Timestamp;

use crate::github::{Deployment, parse_deployment_url};
use crate::model::{Application, HealthStatus, OperationPhase, SyncStatus};

/// Annotation holding the GitHub deployment URL for the current rollout.
pub const DEPLOYMENT_URL_ANNOTATION: &str = "argocd-commenter.int128.github.io/deployment-url";

/// Annotation listing extra paths that affect the generated manifests.
pub const MANIFEST_GENERATE_PATHS_ANNOTATION: &str = "argocd.argoproj.io/manifest-generate-paths";

/// Status facts compared across a `(previous, current)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facts {
    pub health: HealthStatus,
    pub sync: SyncStatus,
    pub phase: OperationPhase,
    pub deletion_requested: bool,
    pub deployment: Option<Deployment>,
}

impl Facts {
    pub fn of(app: &Application) -> Self {
        Self {
            health: app.status.health.status,
            sync: app.status.sync.status,
            phase: operation_phase(app),
            deletion_requested: app.metadata.deletion_timestamp.is_some(),
            deployment: deployment(app),
        }
    }
}

/// A source together with the revision the last sync operation applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRevision {
    pub repo_url: String,
    pub path: String,
    pub revision: String,
}

pub fn operation_phase(app: &Application) -> OperationPhase {
    app.status
        .operation_state
        .as_ref()
        .map_or(OperationPhase::None, |op| op.phase)
}

/// Pairs each source with its synced revision.
///
/// Multi-source operations list `revisions` positionally; single-source ones
/// set `revision`. Extra entries on either side are ignored.
pub fn source_revisions(app: &Application) -> Vec<SourceRevision> {
    let Some(sync) = app
        .status
        .operation_state
        .as_ref()
        .and_then(|op| op.operation.sync.as_ref())
    else {
        return Vec::new();
    };
    let revisions: Vec<&str> = if sync.revisions.is_empty() {
        vec![sync.revision.as_str()]
    } else {
        sync.revisions.iter().map(String::as_str).collect()
    };
    app.spec
        .all_sources()
        .into_iter()
        .zip(revisions)
        .map(|(source, revision)| SourceRevision {
            repo_url: source.repo_url.clone(),
            path: source.path.clone(),
            revision: revision.to_string(),
        })
        .collect()
}

pub fn deployment_url(app: &Application) -> Option<&str> {
    app.annotation(DEPLOYMENT_URL_ANNOTATION)
        .filter(|url| !url.is_empty())
}

/// The deployment reference, if the annotation holds a recognisable URL.
pub fn deployment(app: &Application) -> Option<Deployment> {
    deployment_url(app).and_then(parse_deployment_url)
}

/// The first external URL. Entries may be written `title|url`.
pub fn external_url(app: &Application) -> Option<String> {
    let first = app.status.summary.external_urls.first()?;
    let url = match first.split_once('|') {
        Some((_, url)) => url,
        None => first.as_str(),
    };
    Some(url.to_string()).filter(|u| !u.is_empty())
}

/// When the most recent sync operation started.
pub fn last_operation_at(app: &Application) -> Option<Timestamp> {
    let op = app.status.operation_state.as_ref()?;
    op.started_at.or(op.finished_at)
}
