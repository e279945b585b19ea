//! Turning an application snapshot into payloads for one route.
//!
//! [`compose`] returns `None` when the current state has no outbound
//! representation on the route (a health comment while `Progressing`, a
//! phase deployment status while `Terminating`). The caller must not treat
//! that as delivered. `Some(vec![])` means there is simply nothing to send,
//! for example when no source points at GitHub.

use std::fmt::Write as _;

use crate::extract::{self, SourceRevision};
use crate::github::parse_repository_url;
use crate::model::{
    Application, Comment, DeploymentState, DeploymentStatus, DeploymentStatusPayload,
    HealthStatus, NotificationId, OperationPhase, Payload,
};

use super::Route;

/// GitHub rejects deployment status descriptions longer than this.
pub const DESCRIPTION_LIMIT: usize = 140;

pub fn compose(route: Route, app: &Application, argocd_url: Option<&str>) -> Option<Vec<Payload>> {
    match route {
        Route::TrackState => Some(Vec::new()),
        Route::PhaseComment => {
            let header = phase_header(app, argocd_url)?;
            let failed = is_failed_phase(extract::operation_phase(app));
            Some(comments(route, app, |rev| {
                if failed {
                    format!(
                        "{header}\nError while syncing to {}:\n{}",
                        rev.revision,
                        sync_failures(app)
                    )
                } else {
                    format!("{header} to {}", rev.revision)
                }
            }))
        }
        Route::HealthComment => {
            let health = app.status.health.status;
            let link = application_link(app, argocd_url);
            let heading = match health {
                HealthStatus::Healthy => format!("## :white_check_mark: Healthy: {link}"),
                HealthStatus::Degraded => format!("## :x: Degraded: {link}"),
                _ => return None,
            };
            Some(comments(route, app, |rev| match health {
                HealthStatus::Degraded => format!(
                    "{heading}\nError while deploying {}:\n{}",
                    rev.revision,
                    unhealthy_resources(app)
                ),
                _ => format!("{heading}\nDeployed {}", rev.revision),
            }))
        }
        Route::PhaseDeployment | Route::HealthDeployment | Route::DeletionDeployment => {
            let Some(deployment) = extract::deployment(app) else {
                return Some(Vec::new());
            };
            let status = deployment_status(route, app, argocd_url)?;
            let id = NotificationId::derive(&[
                &app.metadata.uid,
                route.as_str(),
                status.state.as_str(),
                &deployment.to_string(),
                "",
            ]);
            Some(vec![Payload::DeploymentStatus(DeploymentStatusPayload {
                deployment,
                status,
                id,
            })])
        }
    }
}

/// One comment per source revision whose repository is on GitHub.
fn comments(
    route: Route,
    app: &Application,
    body: impl Fn(&SourceRevision) -> String,
) -> Vec<Payload> {
    let state = match route {
        Route::HealthComment => app.status.health.status.as_str(),
        _ => extract::operation_phase(app).as_str(),
    };
    extract::source_revisions(app)
        .iter()
        .filter(|rev| !rev.revision.is_empty())
        .filter_map(|rev| {
            let repository = parse_repository_url(&rev.repo_url)?;
            let id = NotificationId::derive(&[
                &app.metadata.uid,
                route.as_str(),
                state,
                &repository.to_string(),
                &rev.revision,
            ]);
            Some(Payload::Comment(Comment {
                repository,
                revision: rev.revision.clone(),
                source_path: rev.path.trim_start_matches('/').to_string(),
                body: body(rev),
                id,
            }))
        })
        .collect()
}

fn phase_header(app: &Application, argocd_url: Option<&str>) -> Option<String> {
    let link = application_link(app, argocd_url);
    match extract::operation_phase(app) {
        OperationPhase::Running => Some(format!(":warning: Syncing {link}")),
        OperationPhase::Succeeded => Some(format!(":white_check_mark: Synced {link}")),
        phase @ (OperationPhase::Failed | OperationPhase::Error) => {
            Some(format!("## :x: Sync {phase}: {link}"))
        }
        OperationPhase::None | OperationPhase::Terminating => None,
    }
}

fn is_failed_phase(phase: OperationPhase) -> bool {
    matches!(phase, OperationPhase::Failed | OperationPhase::Error)
}

fn deployment_status(
    route: Route,
    app: &Application,
    argocd_url: Option<&str>,
) -> Option<DeploymentStatus> {
    let log_url = argocd_url.map(|base| application_url(base, &app.metadata.name));
    let environment_url = extract::external_url(app);
    let health = &app.status.health;

    let (state, description) = match route {
        Route::PhaseDeployment => {
            let op = app.status.operation_state.as_ref()?;
            let state = match op.phase {
                OperationPhase::Running => DeploymentState::Queued,
                // Some resources never report Progressing; finish right away if already healthy.
                OperationPhase::Succeeded if health.status == HealthStatus::Healthy => {
                    DeploymentState::Success
                }
                OperationPhase::Succeeded => DeploymentState::InProgress,
                OperationPhase::Failed | OperationPhase::Error => DeploymentState::Failure,
                OperationPhase::None | OperationPhase::Terminating => return None,
            };
            (state, format!("{}:\n{}", op.phase, op.message))
        }
        Route::HealthDeployment => {
            let state = match health.status {
                HealthStatus::Healthy => DeploymentState::Success,
                HealthStatus::Degraded => DeploymentState::Failure,
                _ => return None,
            };
            (state, format!("{}:\n{}", health.status, health.message))
        }
        Route::DeletionDeployment => {
            return Some(DeploymentStatus {
                state: DeploymentState::Inactive,
                description: String::new(),
                log_url,
                environment_url: None,
            });
        }
        Route::TrackState | Route::PhaseComment | Route::HealthComment => return None,
    };

    Some(DeploymentStatus {
        state,
        description: truncate_description(&description),
        log_url,
        environment_url,
    })
}

/// Cuts `s` to [`DESCRIPTION_LIMIT`] characters.
pub fn truncate_description(s: &str) -> String {
    s.chars().take(DESCRIPTION_LIMIT).collect()
}

fn application_url(base: &str, name: &str) -> String {
    format!("{}/applications/{name}", base.trim_end_matches('/'))
}

fn application_link(app: &Application, argocd_url: Option<&str>) -> String {
    let name = &app.metadata.name;
    match argocd_url {
        Some(base) => format!("[{name}]({})", application_url(base, name)),
        None => format!("`{name}`"),
    }
}

/// Resources whose sync failed or whose prune was skipped, as a Markdown list.
fn sync_failures(app: &Application) -> String {
    let mut out = String::new();
    let results = app
        .status
        .operation_state
        .as_ref()
        .and_then(|op| op.sync_result.as_ref());
    for r in results.into_iter().flat_map(|r| &r.resources) {
        if matches!(r.status.as_str(), "SyncFailed" | "PruneSkipped") {
            let _ = writeln!(out, "- {} `{}/{}`: {}", r.status, r.namespace, r.name, r.message);
        }
    }
    out
}

/// Degraded or missing resources, as a Markdown list.
fn unhealthy_resources(app: &Application) -> String {
    let mut out = String::new();
    for r in &app.status.resources {
        let Some(health) = &r.health else { continue };
        if matches!(health.status, HealthStatus::Degraded | HealthStatus::Missing) {
            let _ = writeln!(
                out,
                "- {} `{}/{}`: {}",
                health.status, r.namespace, r.name, health.message
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DEPLOYMENT_URL_ANNOTATION;
    use crate::model::{
        ApplicationSource, HealthInfo, Operation, OperationState, ResourceResult, ResourceStatus,
        SyncOperation, SyncResult,
    };

    const ARGOCD: Option<&str> = Some("https://argocd.example.com");

    fn app(phase: OperationPhase, health: HealthStatus) -> Application {
        let mut app = Application::default();
        app.metadata.namespace = "argocd".into();
        app.metadata.name = "app1".into();
        app.metadata.uid = "uid-1".into();
        app.spec.source = Some(ApplicationSource {
            repo_url: "https://github.com/int128/manifests.git".into(),
            path: "applications/app1".into(),
        });
        app.status.health = HealthInfo {
            status: health,
            message: String::new(),
        };
        app.status.operation_state = Some(OperationState {
            phase,
            operation: Operation {
                sync: Some(SyncOperation {
                    revision: "abc123".into(),
                    revisions: Vec::new(),
                }),
            },
            ..OperationState::default()
        });
        app
    }

    fn with_deployment(mut app: Application) -> Application {
        app.metadata.annotations.insert(
            DEPLOYMENT_URL_ANNOTATION.into(),
            "https://api.github.com/repos/int128/manifests/deployments/42".into(),
        );
        app
    }

    fn only_comment(payloads: Vec<Payload>) -> Comment {
        assert_eq!(payloads.len(), 1);
        match payloads.into_iter().next() {
            Some(Payload::Comment(c)) => c,
            other => panic!("expected a comment, got {other:?}"),
        }
    }

    fn only_status(payloads: Vec<Payload>) -> DeploymentStatusPayload {
        assert_eq!(payloads.len(), 1);
        match payloads.into_iter().next() {
            Some(Payload::DeploymentStatus(d)) => d,
            other => panic!("expected a deployment status, got {other:?}"),
        }
    }

    #[test]
    fn running_phase_comment() {
        let c = only_comment(
            compose(Route::PhaseComment, &app(OperationPhase::Running, HealthStatus::Healthy), ARGOCD)
                .unwrap(),
        );
        assert_eq!(c.repository.to_string(), "int128/manifests");
        assert_eq!(c.revision, "abc123");
        assert_eq!(c.source_path, "applications/app1");
        assert_eq!(
            c.body,
            ":warning: Syncing [app1](https://argocd.example.com/applications/app1) to abc123"
        );
    }

    #[test]
    fn failed_phase_comment_lists_failures() {
        let mut a = app(OperationPhase::Failed, HealthStatus::Healthy);
        if let Some(op) = a.status.operation_state.as_mut() {
            op.sync_result = Some(SyncResult {
                resources: vec![
                    ResourceResult {
                        namespace: "default".into(),
                        name: "web".into(),
                        kind: "Deployment".into(),
                        status: "SyncFailed".into(),
                        message: "invalid spec".into(),
                    },
                    ResourceResult {
                        namespace: "default".into(),
                        name: "svc".into(),
                        kind: "Service".into(),
                        status: "Synced".into(),
                        message: String::new(),
                    },
                ],
            });
        }
        let c = only_comment(compose(Route::PhaseComment, &a, None).unwrap());
        assert!(c.body.starts_with("## :x: Sync Failed: `app1`\nError while syncing to abc123:\n"));
        assert!(c.body.contains("- SyncFailed `default/web`: invalid spec"));
        assert!(!c.body.contains("svc"));
    }

    #[test]
    fn progressing_has_no_health_comment() {
        let a = app(OperationPhase::Succeeded, HealthStatus::Progressing);
        assert_eq!(compose(Route::HealthComment, &a, ARGOCD), None);
    }

    #[test]
    fn degraded_health_comment_lists_resources() {
        let mut a = app(OperationPhase::Succeeded, HealthStatus::Degraded);
        a.status.resources = vec![ResourceStatus {
            namespace: "default".into(),
            name: "web".into(),
            kind: "Deployment".into(),
            health: Some(HealthInfo {
                status: HealthStatus::Missing,
                message: "gone".into(),
            }),
        }];
        let c = only_comment(compose(Route::HealthComment, &a, None).unwrap());
        assert!(c.body.starts_with("## :x: Degraded: `app1`\nError while deploying abc123:"));
        assert!(c.body.contains("- Missing `default/web`: gone"));
    }

    #[test]
    fn non_github_sources_are_dropped() {
        let mut a = app(OperationPhase::Succeeded, HealthStatus::Healthy);
        a.spec.source = Some(ApplicationSource {
            repo_url: "https://gitlab.example.com/group/sub/project.git".into(),
            path: String::new(),
        });
        assert_eq!(compose(Route::HealthComment, &a, ARGOCD), Some(Vec::new()));
    }

    #[test]
    fn multi_source_fans_out_per_resolvable_source() {
        let mut a = app(OperationPhase::Succeeded, HealthStatus::Healthy);
        a.spec.sources = vec![
            ApplicationSource {
                repo_url: "https://github.com/int128/manifests".into(),
                path: "app1".into(),
            },
            ApplicationSource {
                repo_url: "oci://registry.example.com/charts".into(),
                path: String::new(),
            },
            ApplicationSource {
                repo_url: "git@github.com:int128/values.git".into(),
                path: "values".into(),
            },
        ];
        if let Some(op) = a.status.operation_state.as_mut() {
            op.operation.sync = Some(SyncOperation {
                revision: String::new(),
                revisions: vec!["r1".into(), "r2".into(), "r3".into()],
            });
        }
        let payloads = compose(Route::HealthComment, &a, ARGOCD).unwrap();
        let targets: Vec<(String, String)> = payloads
            .into_iter()
            .filter_map(|p| match p {
                Payload::Comment(c) => Some((c.repository.to_string(), c.revision)),
                Payload::DeploymentStatus(_) => None,
            })
            .collect();
        assert_eq!(
            targets,
            vec![
                ("int128/manifests".to_string(), "r1".to_string()),
                ("int128/values".to_string(), "r3".to_string())
            ]
        );
    }

    #[test]
    fn health_deployment_status() {
        let mut a = with_deployment(app(OperationPhase::Succeeded, HealthStatus::Healthy));
        a.status.summary.external_urls = vec!["App|https://app.example.com".into()];
        let d = only_status(compose(Route::HealthDeployment, &a, ARGOCD).unwrap());
        assert_eq!(d.deployment.id, 42);
        assert_eq!(d.status.state, DeploymentState::Success);
        assert_eq!(d.status.description, "Healthy:\n");
        assert_eq!(
            d.status.log_url.as_deref(),
            Some("https://argocd.example.com/applications/app1")
        );
        assert_eq!(d.status.environment_url.as_deref(), Some("https://app.example.com"));
    }

    #[test]
    fn phase_deployment_states() {
        let cases = [
            (OperationPhase::Running, HealthStatus::Healthy, DeploymentState::Queued),
            (OperationPhase::Succeeded, HealthStatus::Progressing, DeploymentState::InProgress),
            (OperationPhase::Succeeded, HealthStatus::Healthy, DeploymentState::Success),
            (OperationPhase::Failed, HealthStatus::Healthy, DeploymentState::Failure),
            (OperationPhase::Error, HealthStatus::Degraded, DeploymentState::Failure),
        ];
        for (phase, health, want) in cases {
            let a = with_deployment(app(phase, health));
            let d = only_status(compose(Route::PhaseDeployment, &a, ARGOCD).unwrap());
            assert_eq!(d.status.state, want, "{phase} / {health}");
        }
    }

    #[test]
    fn terminating_has_no_phase_deployment_status() {
        let a = with_deployment(app(OperationPhase::Terminating, HealthStatus::Healthy));
        assert_eq!(compose(Route::PhaseDeployment, &a, ARGOCD), None);
    }

    #[test]
    fn deletion_is_inactive() {
        let a = with_deployment(app(OperationPhase::Succeeded, HealthStatus::Missing));
        let d = only_status(compose(Route::DeletionDeployment, &a, None).unwrap());
        assert_eq!(d.status.state, DeploymentState::Inactive);
        assert_eq!(d.status.log_url, None);
    }

    #[test]
    fn deployment_route_without_reference_sends_nothing() {
        let a = app(OperationPhase::Succeeded, HealthStatus::Healthy);
        assert_eq!(compose(Route::HealthDeployment, &a, ARGOCD), Some(Vec::new()));
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let mut a = with_deployment(app(OperationPhase::Succeeded, HealthStatus::Degraded));
        a.status.health.message = "é".repeat(500);
        let d = only_status(compose(Route::HealthDeployment, &a, ARGOCD).unwrap());
        assert_eq!(d.status.description.chars().count(), DESCRIPTION_LIMIT);
    }

    #[test]
    fn short_descriptions_are_kept() {
        assert_eq!(truncate_description("Healthy:\nok"), "Healthy:\nok");
        assert_eq!(truncate_description(&"x".repeat(140)).len(), 140);
    }

    #[test]
    fn notification_ids_are_deterministic() {
        let a = with_deployment(app(OperationPhase::Succeeded, HealthStatus::Healthy));
        let first = compose(Route::HealthDeployment, &a, ARGOCD).unwrap();
        let second = compose(Route::HealthDeployment, &a, ARGOCD).unwrap();
        assert_eq!(first[0].id(), second[0].id());

        let phase = compose(Route::PhaseDeployment, &a, ARGOCD).unwrap();
        assert_ne!(first[0].id(), phase[0].id());
    }
}
