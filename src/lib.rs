//! releasetag-reminder - nags you to tag a release
//!
//! Clones or refreshes a list of git repositories, compares the newest commit
//! with the newest release tag and posts a webhook message when there is
//! unreleased work, or when a new tag has just been pushed.
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration and per-repository defaults
//! - [`git`]: the `VersionControl` seam and its git CLI implementation
//! - [`freshness`]: the commit/tag comparison
//! - [`notify`]: webhook delivery
//! - [`workspace`]: scratch tree layout and cache policy
//! - [`checker`]: the per-repository run loop
//! - [`schedule`]: periodic runs

pub mod checker;
pub mod config;
pub mod freshness;
pub mod git;
pub mod notify;
pub mod schedule;
pub mod workspace;

pub use checker::{ReleaseChecker, RepoOutcome, RunSummary};
pub use config::{Config, RepositoryConfig};
pub use freshness::{assess, Notice, Observation, TagState, Timestamp};
pub use git::{GitCli, VersionControl};
pub use notify::{LogNotifier, Notifier, SlackWebhook};
pub use workspace::Workspace;
