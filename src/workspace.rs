//! Scratch tree layout
//!
//! `<tree>/<clone-url with path separators replaced by '_'>/<name>/` holds each
//! clone. Persistent runs use the configured directory as the tree; ephemeral
//! runs use a [`SCRATCH_DIR`] subdirectory of it and only ever delete that.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{CachePolicy, RepositoryConfig, WorkspaceConfig};

/// Subdirectory owned by ephemeral runs
pub const SCRATCH_DIR: &str = "releasetag-reminder-temp";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    policy: CachePolicy,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(&config.directory, config.policy)
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Directory holding the clones for this policy
    pub fn tree(&self) -> PathBuf {
        match self.policy {
            CachePolicy::Persistent => self.root.clone(),
            CachePolicy::Ephemeral => self.root.join(SCRATCH_DIR),
        }
    }

    /// Directory the repository is (or will be) cloned into
    pub fn repo_dir(&self, repo: &RepositoryConfig) -> PathBuf {
        self.tree()
            .join(url_directory_name(&repo.clone_url))
            .join(&repo.name)
    }

    /// A clone from an earlier run that can be refreshed instead of re-cloned
    pub fn has_clone(&self, repo: &RepositoryConfig) -> bool {
        self.policy == CachePolicy::Persistent && self.repo_dir(repo).join(".git").exists()
    }

    /// Prepare the tree for a run; the guard clears it again on drop when ephemeral
    pub fn acquire(&self) -> Result<WorkspaceGuard> {
        let tree = self.tree();
        if self.policy == CachePolicy::Ephemeral {
            remove_tree(&tree)?;
        }

        std::fs::create_dir_all(&tree)
            .with_context(|| format!("Failed to create workspace {}", tree.display()))?;

        Ok(WorkspaceGuard {
            tree,
            remove_on_drop: self.policy == CachePolicy::Ephemeral,
        })
    }

    /// Drop a half-finished clone so the next run starts clean
    pub fn discard(&self, repo: &RepositoryConfig) -> Result<()> {
        remove_tree(&self.repo_dir(repo))
    }
}

/// Keeps the workspace alive for the duration of a run
#[derive(Debug)]
pub struct WorkspaceGuard {
    tree: PathBuf,
    remove_on_drop: bool,
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.remove_on_drop {
            debug!("Removing ephemeral workspace {}", self.tree.display());
            if let Err(e) = remove_tree(&self.tree) {
                warn!("Failed to remove workspace {}: {:#}", self.tree.display(), e);
            }
        }
    }
}

/// Clone URL turned into a single directory name
pub fn url_directory_name(clone_url: &str) -> String {
    clone_url.replace(['/', '\\'], "_")
}

fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
