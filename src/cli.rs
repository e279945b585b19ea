//! Command-line interface.
//!
//! - `argocd-notify run` watches applications and delivers notifications.
//! - `argocd-notify markers` and `argocd-notify events` inspect what was
//!   persisted, for operators debugging a missing or duplicate notification.

mod format;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::controller::Controller;
use crate::github::GhClient;
use crate::model::ResourceKey;
use crate::notify::{Notifier, SystemClock};
use crate::storage::Storage;

use format::{format_event, format_marker};

/// Argo CD notifier: GitHub comments and deployment statuses for application changes.
#[derive(Debug, Parser)]
#[command(name = "argocd-notify", after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Storage root (default: `~/.argocd-notify`).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Config file (default: `~/.argocd-notify/config.toml`, optional).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const USAGE_HELP: &str = r"Watching a cluster:
  kubectl get applications -A -w -o json --output-watch-events | argocd-notify run

Inspecting state:
  argocd-notify markers
  argocd-notify events argocd/my-app";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read application watch events and deliver notifications.
    ///
    /// Input is a stream of JSON documents: watch events, `List`s, or bare
    /// `Application` objects. Runs until the input ends.
    Run {
        /// Read from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Parallel reconciliation workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Base URL of the Argo CD UI, used for links.
        #[arg(long)]
        argocd_url: Option<String>,

        /// Seconds between lookups of a deployment that does not exist yet.
        #[arg(long)]
        requeue_interval_secs: Option<u64>,

        /// Seconds after the last operation to keep looking for a deployment.
        #[arg(long)]
        requeue_timeout_secs: Option<u64>,
    },

    /// List notification markers.
    Markers,

    /// List recorded events, optionally for one application.
    Events {
        /// Application as `NAMESPACE/NAME`.
        resource: Option<String>,
    },
}

/// Run a parsed command, returning an error message on failure.
pub fn run(command: Command, mut config: Config, storage: Arc<Storage>) -> Result<(), String> {
    match command {
        Command::Run {
            input,
            workers,
            argocd_url,
            requeue_interval_secs,
            requeue_timeout_secs,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if argocd_url.is_some() {
                config.argocd_url = argocd_url;
            }
            if let Some(secs) = requeue_interval_secs {
                config.requeue_interval_secs = secs;
            }
            if let Some(secs) = requeue_timeout_secs {
                config.requeue_timeout_secs = secs;
            }
            config.validate().map_err(|e| e.to_string())?;
            cmd_run(&config, storage, input.as_deref())
        }
        Command::Markers => cmd_markers(&storage),
        Command::Events { resource } => cmd_events(&storage, resource.as_deref()),
    }
}

fn cmd_run(config: &Config, storage: Arc<Storage>, input: Option<&Path>) -> Result<(), String> {
    let notifier = Notifier::new(
        storage.clone(),
        storage,
        Arc::new(GhClient::new(config.gh_config_dir.clone())),
        Arc::new(SystemClock),
        config.notifier_settings(),
    );
    let controller = Controller::new(notifier, config.controller_settings());

    let result = match input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
            controller.run(BufReader::new(file), config.workers)
        }
        None => controller.run(io::stdin().lock(), config.workers),
    };
    result.map_err(|e| e.to_string())
}

fn cmd_markers(storage: &Storage) -> Result<(), String> {
    let markers = storage
        .list_markers()
        .map_err(|e| format!("failed to list markers: {e}"))?;

    if markers.is_empty() {
        println!("No markers");
        return Ok(());
    }
    for marker in &markers {
        println!("{}", format_marker(marker));
    }
    Ok(())
}

fn cmd_events(storage: &Storage, resource: Option<&str>) -> Result<(), String> {
    let key = resource
        .map(str::parse::<ResourceKey>)
        .transpose()
        .map_err(|e| format!("invalid resource: {e}"))?;
    let events = storage
        .list_events(key.as_ref())
        .map_err(|e| format!("failed to list events: {e}"))?;

    if events.is_empty() {
        println!("No events");
        return Ok(());
    }
    for event in &events {
        println!("{}", format_event(event));
    }
    Ok(())
}
