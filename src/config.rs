use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV_VAR: &str = "GITHUB_RELEASE_MONITOR_CONFIG";

/// Configuration file used when neither `--config` nor the environment names one
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

const DEFAULT_MAX_PARALLEL: usize = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Monitor configuration and observed state.
///
/// The same document holds user settings and the last seen release tag of
/// every repository, so it is written back after each check cycle.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// GitHub access token (falls back to GITHUB_TOKEN, then anonymous access)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Poll interval in seconds; 0 runs a single check and exits
    #[serde(default)]
    pub interval: u64,

    /// Maximum concurrent repository checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Timeout for a single repository check in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Monitored repositories
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,

    /// Notification channels
    #[serde(default)]
    pub notifications: Vec<NotificationChannel>,
}

/// A monitored repository and the last release tag seen for it
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct RepositoryEntry {
    /// Repository in `owner/name` form
    pub slug: String,

    /// Empty until the first release has been observed
    #[serde(default)]
    pub current_release_tag: String,
}

impl RepositoryEntry {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            current_release_tag: String::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.current_release_tag = tag.into();
        self
    }
}

/// Notification destination, e.g. `discord://token@id` or `generic+https://host/hook`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub url: String,
}

impl NotificationChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Config {
    /// Load configuration from a specific file.
    ///
    /// A missing, empty or malformed file is an error: the monitor refuses
    /// to start without a readable configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            bail!("Config file is empty: {:?}", path);
        }

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if config.access_token.as_deref().is_some_and(str::is_empty) {
            config.access_token = None;
        }

        debug!(
            "Loaded {} repositories and {} notification channels from {:?}",
            config.repositories.len(),
            config.notifications.len(),
            path
        );

        Ok(config)
    }

    /// Save configuration to a file.
    ///
    /// Writes a sibling `.tmp` file, syncs it and renames it over the target,
    /// so an interrupted write leaves the previous file intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        let tmp_path = temp_path_for(path);
        let replaced = write_synced(&tmp_path, content.as_bytes()).and_then(|()| {
            std::fs::rename(&tmp_path, path)
                .with_context(|| format!("Failed to replace config file: {:?}", path))
        });

        if let Err(e) = replaced {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        #[cfg(unix)]
        {
            let parent = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::File::open(parent)
                .and_then(|dir| dir.sync_all())
                .with_context(|| format!("Failed to sync config directory: {:?}", parent))?;
        }

        Ok(())
    }

    /// Resolve the configuration path: CLI flag, then environment, then `config.yml`
    pub fn resolve_path(cli_path: Option<PathBuf>) -> PathBuf {
        if let Some(path) = cli_path {
            return path;
        }

        match std::env::var(CONFIG_ENV_VAR) {
            Ok(value) if !value.is_empty() => PathBuf::from(shellexpand::tilde(&value).into_owned()),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Poll period, or `None` in one-shot mode
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.interval > 0).then(|| Duration::from_secs(self.interval))
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL).max(1)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }
}

fn write_synced(tmp_path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp_path)
        .with_context(|| format!("Failed to create temporary config file: {:?}", tmp_path))?;
    file.write_all(content)
        .with_context(|| format!("Failed to write config file: {:?}", tmp_path))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync config file: {:?}", tmp_path))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
