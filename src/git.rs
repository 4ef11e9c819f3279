use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::config::GitConfig;
use crate::freshness::{TagState, Timestamp};

/// Operations the checker needs from a version-control tool.
///
/// Every call takes the repository directory explicitly; implementations must
/// never rely on the process working directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `url` into `target`, which must not exist yet
    async fn clone_repo(&self, url: &str, target: &Path) -> Result<()>;

    /// Bring an existing clone up to date, including new tags
    async fn pull(&self, repo_dir: &Path) -> Result<()>;

    /// Timestamp of the tip commit
    async fn commit_timestamp(&self, repo_dir: &Path) -> Result<Timestamp>;

    /// Most recently created tag, or `None` when the repository has no tags
    async fn latest_tag(&self, repo_dir: &Path) -> Result<Option<TagState>>;
}

/// `VersionControl` backed by the git command-line tool
#[derive(Debug, Clone)]
pub struct GitCli {
    config: GitConfig,
}

impl GitCli {
    /// Create a new Git client with the given configuration
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    /// Fail early when the configured git binary cannot be executed
    pub async fn ensure_available(&self) -> Result<String> {
        let version = self.run(None, &["--version"]).await.with_context(|| {
            format!(
                "Git not usable (tried `{}`). Install git: https://git-scm.com/downloads",
                self.config.binary
            )
        })?;
        Ok(version.trim().to_string())
    }

    /// Run git with `args`, returning stdout; a non-zero exit is an error.
    /// Color is forced off so user config cannot decorate scraped output.
    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut command = AsyncCommand::new(&self.config.binary);
        command.args(["-c", "color.ui=never"]).args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        debug!("Running {} {}", self.config.binary, args.join(" "));

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to execute {} {}", self.config.binary, args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "git {} failed ({}): {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `git show -s --date=raw <rev>` reduced to a timestamp
    async fn revision_timestamp(&self, repo_dir: &Path, rev: &str) -> Result<Timestamp> {
        let output = self
            .run(Some(repo_dir), &["show", "-s", "--no-color", "--date=raw", rev])
            .await?;
        extract_timestamp(&output, &self.config.timezone_offset)
            .with_context(|| format!("Failed to read date of {}", rev))
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn clone_repo(&self, url: &str, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        info!("Cloning {} -> {}", url, target.display());

        let target_str = target.to_string_lossy();
        self.run(None, &["clone", "--", url, target_str.as_ref()])
            .await
            .with_context(|| format!("Failed to clone {}", url))?;
        Ok(())
    }

    async fn pull(&self, repo_dir: &Path) -> Result<()> {
        let mut args = vec!["pull", "--tags"];
        if self.config.fast_forward_only {
            args.push("--ff-only");
        }

        info!("Pulling {}", repo_dir.display());
        self.run(Some(repo_dir), &args)
            .await
            .with_context(|| format!("Failed to pull {}", repo_dir.display()))?;
        Ok(())
    }

    async fn commit_timestamp(&self, repo_dir: &Path) -> Result<Timestamp> {
        let log = self
            .run(Some(repo_dir), &["log", "-1", "--no-color"])
            .await?;
        match latest_commit_id(&log)? {
            Some(commit) => self.revision_timestamp(repo_dir, &commit).await,
            None => Ok(Timestamp::ZERO),
        }
    }

    async fn latest_tag(&self, repo_dir: &Path) -> Result<Option<TagState>> {
        let refs = self
            .run(
                Some(repo_dir),
                &["for-each-ref", "--sort=creatordate", "refs/tags"],
            )
            .await?;

        let Some(name) = latest_tag_name(&refs) else {
            return Ok(None);
        };

        let timestamp = self
            .revision_timestamp(repo_dir, &format!("refs/tags/{}", name))
            .await?;
        Ok(Some(TagState { name, timestamp }))
    }
}

/// Reduce `git show --date=raw` output to a timestamp.
///
/// Only the first line starting with `Date` counts. The label, every copy of
/// `offset` and all whitespace are stripped and the rest must be digits.
/// Output without a `Date` line yields zero.
pub fn extract_timestamp(show_output: &str, offset: &str) -> Result<Timestamp> {
    let Some(line) = show_output.lines().find(|line| line.starts_with("Date")) else {
        return Ok(Timestamp::ZERO);
    };

    let mut raw = line.replace("Date:", "");
    if !offset.is_empty() {
        raw = raw.replace(offset, "");
    }
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    digits
        .parse::<i64>()
        .map(Timestamp)
        .with_context(|| format!("Unexpected date line {:?} (expected offset {})", line, offset))
}

/// Pick the tag name from the last `refs/tags/` line of a creation-date sorted listing
pub fn latest_tag_name(refs_output: &str) -> Option<String> {
    const PREFIX: &str = "refs/tags/";

    refs_output
        .lines()
        .filter_map(|line| {
            line.find(PREFIX)
                .map(|pos| line[pos + PREFIX.len()..].trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .last()
}

/// Commit id from the first `commit <sha>` line of `git log`.
///
/// Empty output means there is no commit. Output without a `commit` line is
/// an error rather than a silent zero.
pub fn latest_commit_id(log_output: &str) -> Result<Option<String>> {
    if log_output.trim().is_empty() {
        return Ok(None);
    }

    log_output
        .lines()
        .find(|line| line.starts_with("commit "))
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|id| Some(id.to_string()))
        .ok_or_else(|| {
            let first = log_output.lines().next().unwrap_or_default();
            anyhow!("No commit line in git log output (starts with {:?})", first)
        })
}
