use anyhow::{anyhow, bail, Context, Result};
use dirs::cache_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::schedule::parse_interval;

/// Main configuration structure, as read from the YAML file
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Webhook endpoint used when a repository does not override it
    pub default_endpoint: String,

    /// Channel used when a repository does not override it
    pub default_channel: String,

    /// Bot display name used when a repository does not override it
    pub default_bot_name: String,

    /// Bot icon (emoji like `:ghost:` or an image URL)
    pub default_bot_icon: String,

    /// Repositories to watch, processed in this order
    pub repositories: Vec<RepositoryEntry>,

    /// Scratch directory and clone cache settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Git invocation settings
    #[serde(default)]
    pub git: GitConfig,

    /// Periodic run settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One entry under `repositories:`; notification fields fall back to the defaults
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RepositoryEntry {
    pub name: String,
    pub clone_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_icon: Option<String>,
}

/// A repository with every notification field resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub name: String,
    pub clone_url: String,
    pub endpoint: String,
    pub channel: String,
    pub bot_name: String,
    pub bot_icon: String,
}

/// What happens to the scratch tree between runs
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Keep clones between runs; existing clones are refreshed with `git pull`
    #[default]
    Persistent,
    /// Remove the whole workspace at the start and end of every run
    Ephemeral,
}

/// Workspace configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceConfig {
    /// Root of the scratch tree
    #[serde(default = "default_workspace_directory")]
    pub directory: String,

    #[serde(default)]
    pub policy: CachePolicy,
}

/// Git configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct GitConfig {
    /// Git executable
    #[serde(default = "default_git_binary")]
    pub binary: String,

    /// Literal offset stripped from `--date=raw` output before parsing
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset: String,

    /// Pass `--ff-only` to `git pull`
    #[serde(default = "default_true")]
    pub fast_forward_only: bool,
}

/// Schedule configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Re-run interval such as "30m" or "1h"; absent means a single run
    #[serde(default)]
    pub interval: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "full", "pretty"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_workspace_directory() -> String {
    match cache_dir() {
        Some(dir) => dir
            .join("releasetag-reminder")
            .to_string_lossy()
            .into_owned(),
        None => "releasetag-reminder-temp".to_string(),
    }
}
fn default_git_binary() -> String {
    "git".to_string()
}
fn default_timezone_offset() -> String {
    "+0900".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            directory: default_workspace_directory(),
            policy: CachePolicy::default(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            timezone_offset: default_timezone_offset(),
            fast_forward_only: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl Config {
    /// Load, expand and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let path = Self::resolve_path(path)?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Config =
            serde_yaml::from_str(content).context("Failed to parse config YAML")?;

        config.expand_paths()?;
        config.validate()?;

        Ok(config)
    }

    /// Expand `~` and environment variables in the config path, then normalise it
    pub fn resolve_path(path: &Path) -> Result<PathBuf> {
        let raw = path.to_string_lossy();
        let expanded = shellexpand::full(raw.as_ref())
            .with_context(|| format!("Failed to expand config path: {}", raw))?;
        Ok(PathBuf::from(expanded.as_ref()).clean())
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.workspace.directory = shellexpand::full(&self.workspace.directory)
            .context("Failed to expand workspace directory path")?
            .into_owned();

        Ok(())
    }

    /// Reject configurations that would only fail later, mid-run
    pub fn validate(&self) -> Result<()> {
        let defaults = [
            ("default-endpoint", &self.default_endpoint),
            ("default-channel", &self.default_channel),
            ("default-bot-name", &self.default_bot_name),
            ("default-bot-icon", &self.default_bot_icon),
        ];
        for (key, value) in defaults {
            if value.trim().is_empty() {
                bail!("`{}` must not be empty", key);
            }
        }

        let mut seen = HashSet::new();
        for (index, repo) in self.repositories.iter().enumerate() {
            if repo.name.trim().is_empty() {
                bail!("repositories[{}]: `name` must not be empty", index);
            }
            if repo.clone_url.trim().is_empty() {
                bail!("repository {}: `clone-url` must not be empty", repo.name);
            }
            if repo.name.contains(['/', '\\']) || repo.name == "." || repo.name == ".." {
                bail!("repository {}: `name` must be a plain directory name", repo.name);
            }
            if !seen.insert(repo.name.as_str()) {
                bail!("repository {} is listed more than once", repo.name);
            }
        }

        if self.git.timezone_offset.trim().is_empty() {
            return Err(anyhow!("`git.timezone-offset` must not be empty"));
        }

        if let Some(interval) = &self.schedule.interval {
            parse_interval(interval).context("Invalid `schedule.interval`")?;
        }

        Ok(())
    }

    /// Repositories with default notification settings filled in, in file order
    pub fn repositories(&self) -> Vec<RepositoryConfig> {
        self.repositories
            .iter()
            .map(|entry| RepositoryConfig {
                name: entry.name.clone(),
                clone_url: entry.clone_url.clone(),
                endpoint: entry
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| self.default_endpoint.clone()),
                channel: entry
                    .channel
                    .clone()
                    .unwrap_or_else(|| self.default_channel.clone()),
                bot_name: entry
                    .bot_name
                    .clone()
                    .unwrap_or_else(|| self.default_bot_name.clone()),
                bot_icon: entry
                    .bot_icon
                    .clone()
                    .unwrap_or_else(|| self.default_bot_icon.clone()),
            })
            .collect()
    }
}
