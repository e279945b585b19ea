//! Recognising repository and deployment URLs.
//!
//! Anything that doesn't match yields `None`. Applications pointing at other
//! git hosts, or without a deployment annotation, are normal.

use std::sync::LazyLock;

use regex::Regex;

use super::{Deployment, Repository};

static REPOSITORY_HTTPS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https://([^/@]+)/([^/]+)/([^/]+?)(?:\.git)?/?$").ok());

static REPOSITORY_SSH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^git@([^:/]+):([^/]+)/([^/]+?)(?:\.git)?$").ok());

static DEPLOYMENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^https://([^/]+)(?:/api/v3)?/repos/([^/]+)/([^/]+)/deployments/(\d+)$").ok()
});

/// Parses `https://<host>/<owner>/<repo>[.git]` or `git@<host>:<owner>/<repo>[.git]`.
pub fn parse_repository_url(url: &str) -> Option<Repository> {
    let caps = REPOSITORY_HTTPS
        .as_ref()?
        .captures(url)
        .or_else(|| REPOSITORY_SSH.as_ref()?.captures(url))?;
    let name = &caps[3];
    if name.is_empty() {
        return None;
    }
    Some(Repository {
        host: caps[1].to_string(),
        owner: caps[2].to_string(),
        name: name.to_string(),
    })
}

/// Parses `https://<host>/repos/<owner>/<repo>/deployments/<id>`.
///
/// The REST host `api.github.com` maps to `github.com`; Enterprise servers
/// serve the API under `/api/v3` on their own hostname.
pub fn parse_deployment_url(url: &str) -> Option<Deployment> {
    let caps = DEPLOYMENT.as_ref()?.captures(url)?;
    let id = caps[4].parse().ok()?;
    let host = match &caps[1] {
        "api.github.com" => "github.com".to_string(),
        other => other.to_string(),
    };
    Some(Deployment {
        repository: Repository {
            host,
            owner: caps[2].to_string(),
            name: caps[3].to_string(),
        },
        id,
    })
}
