//! Notifier configuration.
//!
//! Loaded from `~/.argocd-notify/config.toml` unless a path is given. A
//! missing default file yields defaults. Selected settings can be overridden
//! from the environment, and CLI flags override both.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerSettings;
use crate::notify::{NotifierSettings, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Delay between lookups of a deployment that does not exist yet.
    pub requeue_interval_secs: u64,
    /// How long after the last operation a missing deployment is retried.
    pub requeue_timeout_secs: u64,
    /// Base URL of the Argo CD UI, e.g. `https://argocd.example.com`.
    pub argocd_url: Option<String>,
    /// Comment on the commit when no pull request relates to a revision.
    pub create_commit_comment: bool,
    pub workers: usize,
    pub reconcile_timeout_secs: u64,
    pub max_retries: u32,
    /// `GH_CONFIG_DIR` for the `gh` subprocess.
    pub gh_config_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            requeue_interval_secs: 30,
            requeue_timeout_secs: 600,
            argocd_url: None,
            create_commit_comment: false,
            workers: 4,
            reconcile_timeout_secs: 60,
            max_retries: 5,
            gh_config_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads the config file, then applies environment overrides.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// tried and defaults are used if nothing is there.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("ARGOCD_NOTIFY_ARGOCD_URL") {
            self.argocd_url = Some(url);
        }
        if let Some(secs) = lookup("ARGOCD_NOTIFY_REQUEUE_INTERVAL_SECS") {
            self.requeue_interval_secs = parse_secs("ARGOCD_NOTIFY_REQUEUE_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("ARGOCD_NOTIFY_REQUEUE_TIMEOUT_SECS") {
            self.requeue_timeout_secs = parse_secs("ARGOCD_NOTIFY_REQUEUE_TIMEOUT_SECS", &secs)?;
        }
        if lookup("FEATURE_CREATE_COMMIT_COMMENT").as_deref() == Some("true") {
            self.create_commit_comment = true;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requeue_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "requeue-interval-secs must be positive".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be positive".to_string()));
        }
        if self.reconcile_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reconcile-timeout-secs must be positive".to_string(),
            ));
        }
        if let Some(url) = &self.argocd_url
            && !(url.starts_with("https://") || url.starts_with("http://"))
        {
            return Err(ConfigError::Invalid(format!(
                "argocd-url must be an http(s) URL, got {url:?}"
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_secs(self.requeue_interval_secs),
            timeout: Duration::from_secs(self.requeue_timeout_secs),
        }
    }

    pub fn notifier_settings(&self) -> NotifierSettings {
        NotifierSettings {
            retry: self.retry_policy(),
            argocd_url: self
                .argocd_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string()),
            create_commit_comment: self.create_commit_comment,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            max_retries: self.max_retries,
        }
    }

    /// The default config file path: `~/.argocd-notify/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".argocd-notify").join("config.toml"))
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{name}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "argocd-url = \"https://argocd.example.com/\"\nworkers = 2\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.requeue_interval_secs, 30);
        assert_eq!(config.requeue_timeout_secs, 600);
        assert_eq!(
            config.notifier_settings().argocd_url.as_deref(),
            Some("https://argocd.example.com")
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn unknown_value_type_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "workers = \"many\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("ARGOCD_NOTIFY_ARGOCD_URL", "https://cd.example.com"),
                ("ARGOCD_NOTIFY_REQUEUE_INTERVAL_SECS", "5"),
                ("ARGOCD_NOTIFY_REQUEUE_TIMEOUT_SECS", "120"),
                ("FEATURE_CREATE_COMMIT_COMMENT", "true"),
            ]))
            .unwrap();

        assert_eq!(config.argocd_url.as_deref(), Some("https://cd.example.com"));
        assert!(config.create_commit_comment);
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                interval: Duration::from_secs(5),
                timeout: Duration::from_secs(120),
            }
        );
    }

    #[test]
    fn commit_comment_flag_needs_literal_true() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("FEATURE_CREATE_COMMIT_COMMENT", "1")]))
            .unwrap();
        assert!(!config.create_commit_comment);
    }

    #[test]
    fn malformed_env_number_is_rejected() {
        let err = Config::default()
            .apply_env(env(&[("ARGOCD_NOTIFY_REQUEUE_TIMEOUT_SECS", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            argocd_url: Some("argocd.example.com".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }
}
