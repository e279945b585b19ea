//! GitHub as a delivery target.
//!
//! Repository and deployment references are parsed from URLs found on the
//! watched application. Delivery goes through the [`DeliveryClient`] trait;
//! the production implementation shells out to the `gh` CLI.

mod client;
#[cfg(test)]
pub mod fake;
mod gh;
mod url;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::{CommentTarget, DeliveryClient, DeliveryError, PullRequest};
pub use gh::GhClient;
pub use url::{parse_deployment_url, parse_repository_url};

/// A repository on a GitHub host (github.com or an Enterprise server).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    /// Web hostname, as `gh api --hostname` expects it.
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A deployment created by CI, referenced by the application annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deployment {
    pub repository: Repository,
    pub id: u64,
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/deployments/{}", self.repository, self.id)
    }
}
