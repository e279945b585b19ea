//! [`DeliveryClient`] backed by the `gh` CLI.
//!
//! Each call is one `gh api` invocation against the repository's host.
//! Authentication is whatever `gh` is logged in as, optionally from a
//! dedicated `GH_CONFIG_DIR`.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cancel::Cancellation;
use crate::model::{DeploymentState, DeploymentStatus};

use super::{CommentTarget, Deployment, DeliveryClient, DeliveryError, PullRequest, Repository};

/// How often a running `gh` process is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct GhClient {
    config_dir: Option<PathBuf>,
}

impl GhClient {
    pub fn new(config_dir: Option<PathBuf>) -> Self {
        Self { config_dir }
    }

    /// Runs `gh api --hostname <host> <args..>` and returns stdout.
    ///
    /// The child is killed if `cancel` fires before it exits.
    fn api(&self, host: &str, args: &[String], cancel: &Cancellation) -> Result<String, DeliveryError> {
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }

        let mut command = Command::new("gh");
        command
            .args(["api", "--hostname", host])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config_dir {
            command.env("GH_CONFIG_DIR", dir);
        }
        debug!(host, ?args, "gh api");

        let mut child = command.spawn()?;
        // Drain both pipes on their own threads so a chatty child can't block on a full pipe.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout = thread::spawn(move || read_pipe(stdout));
        let stderr = thread::spawn(move || read_pipe(stderr));

        let status = wait_or_cancel(&mut child, cancel)?;

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        if status.success() {
            Ok(stdout)
        } else {
            Err(classify_failure(&stderr))
        }
    }

    fn repo_path(repository: &Repository) -> String {
        format!("repos/{}/{}", repository.owner, repository.name)
    }

    fn pull_request_files(
        &self,
        repository: &Repository,
        number: u64,
        cancel: &Cancellation,
    ) -> Result<Vec<String>, DeliveryError> {
        let endpoint = format!("{}/pulls/{number}/files", Self::repo_path(repository));
        let out = self.api(&repository.host, &[endpoint, "--paginate".into()], cancel)?;
        let files: Vec<GhFile> = parse_pages(&out)?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }
}

impl DeliveryClient for GhClient {
    fn list_pull_requests(
        &self,
        repository: &Repository,
        revision: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, DeliveryError> {
        let endpoint = format!("{}/commits/{revision}/pulls", Self::repo_path(repository));
        let out = self.api(&repository.host, &[endpoint, "--paginate".into()], cancel)?;
        let pulls: Vec<GhPull> = parse_pages(&out)?;

        let mut result = Vec::with_capacity(pulls.len());
        for pull in pulls {
            let files = self.pull_request_files(repository, pull.number, cancel)?;
            result.push(PullRequest {
                number: pull.number,
                files,
            });
        }
        Ok(result)
    }

    fn create_comment(
        &self,
        repository: &Repository,
        target: &CommentTarget,
        body: &str,
        cancel: &Cancellation,
    ) -> Result<(), DeliveryError> {
        let endpoint = match target {
            CommentTarget::PullRequest(number) => {
                format!("{}/issues/{number}/comments", Self::repo_path(repository))
            }
            CommentTarget::Commit(sha) => {
                format!("{}/commits/{sha}/comments", Self::repo_path(repository))
            }
        };
        let args = vec![
            endpoint,
            "--method".into(),
            "POST".into(),
            "-f".into(),
            format!("body={body}"),
        ];
        self.api(&repository.host, &args, cancel)?;
        Ok(())
    }

    fn create_deployment_status(
        &self,
        deployment: &Deployment,
        status: &DeploymentStatus,
        cancel: &Cancellation,
    ) -> Result<(), DeliveryError> {
        let endpoint = format!(
            "{}/deployments/{}/statuses",
            Self::repo_path(&deployment.repository),
            deployment.id
        );
        let mut args = vec![
            endpoint,
            "--method".into(),
            "POST".into(),
            "-f".into(),
            format!("state={}", status.state),
            "-f".into(),
            format!("description={}", status.description),
        ];
        if let Some(url) = &status.log_url {
            args.extend(["-f".into(), format!("log_url={url}")]);
        }
        if let Some(url) = &status.environment_url {
            args.extend(["-f".into(), format!("environment_url={url}")]);
        }
        self.api(&deployment.repository.host, &args, cancel)?;
        Ok(())
    }

    fn find_latest_deployment_status(
        &self,
        deployment: &Deployment,
        cancel: &Cancellation,
    ) -> Result<Option<DeploymentStatus>, DeliveryError> {
        let endpoint = format!(
            "{}/deployments/{}/statuses?per_page=1",
            Self::repo_path(&deployment.repository),
            deployment.id
        );
        let out = self.api(&deployment.repository.host, &[endpoint], cancel)?;
        let statuses: Vec<GhDeploymentStatus> = serde_json::from_str(&out)?;
        Ok(statuses.into_iter().next().map(Into::into))
    }
}

// ── Response shapes ──

#[derive(Deserialize)]
struct GhPull {
    number: u64,
}

#[derive(Deserialize)]
struct GhFile {
    filename: String,
}

#[derive(Deserialize)]
struct GhDeploymentStatus {
    state: DeploymentState,
    description: Option<String>,
    log_url: Option<String>,
    environment_url: Option<String>,
}

impl From<GhDeploymentStatus> for DeploymentStatus {
    fn from(s: GhDeploymentStatus) -> Self {
        Self {
            state: s.state,
            description: s.description.unwrap_or_default(),
            log_url: s.log_url.filter(|u| !u.is_empty()),
            environment_url: s.environment_url.filter(|u| !u.is_empty()),
        }
    }
}

// ── Helpers ──

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

/// `gh api --paginate` prints one JSON array per page back to back.
fn parse_pages<T: DeserializeOwned>(out: &str) -> Result<Vec<T>, DeliveryError> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_str(out).into_iter::<Vec<T>>() {
        items.extend(page?);
    }
    Ok(items)
}

/// `gh` reports HTTP failures on stderr as `gh: <message> (HTTP <code>)`.
fn classify_failure(stderr: &str) -> DeliveryError {
    let message = stderr.trim().trim_start_matches("gh: ").to_string();
    if message.contains("(HTTP 404)") {
        DeliveryError::NotFound(message)
    } else {
        DeliveryError::Api(message)
    }
}

/// Waits for `child` to exit, killing it if `cancel` fires first.
///
/// The child is reaped on every path.
fn wait_or_cancel(child: &mut Child, cancel: &Cancellation) -> Result<ExitStatus, DeliveryError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if cancel.is_cancelled() => {
                reap(child);
                return Err(DeliveryError::Cancelled);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                reap(child);
                return Err(e.into());
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
