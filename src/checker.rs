//! Release checker - walks the configured repositories one at a time
//!
//! Each repository is cloned or refreshed, observed, assessed and notified in
//! turn. A failure is recorded against that repository and the walk carries on
//! with the next one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{Config, RepositoryConfig};
use crate::freshness::{assess, Notice, Observation};
use crate::git::VersionControl;
use crate::notify::{Notifier, NotifyTarget};
use crate::workspace::Workspace;

/// How the local copy was brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Cloned,
    Pulled,
}

/// Result of checking one repository
#[derive(Debug, Clone)]
pub enum RepoOutcome {
    /// Latest tag covers the latest commit and nothing new was tagged
    UpToDate { name: String, refresh: Refresh },
    /// One or more notices were sent
    Notified {
        name: String,
        refresh: Refresh,
        notices: Vec<Notice>,
    },
    /// Something went wrong; notices sent before the failure are listed
    Failed {
        name: String,
        error: String,
        sent: Vec<Notice>,
    },
}

impl RepoOutcome {
    pub fn name(&self) -> &str {
        match self {
            RepoOutcome::UpToDate { name, .. }
            | RepoOutcome::Notified { name, .. }
            | RepoOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RepoOutcome::Failed { .. })
    }

    /// How the clone was brought up to date, if it got that far
    pub fn refresh(&self) -> Option<Refresh> {
        match self {
            RepoOutcome::UpToDate { refresh, .. } | RepoOutcome::Notified { refresh, .. } => {
                Some(*refresh)
            }
            RepoOutcome::Failed { .. } => None,
        }
    }
}

/// Results from a complete run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub total_repositories: usize,
    pub up_to_date: usize,
    pub notified: usize,
    pub failed: usize,
    pub notices_sent: usize,
    pub cloned: usize,
    pub pulled: usize,
    pub duration: Duration,
    pub results: Vec<RepoOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(
        results: Vec<RepoOutcome>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut up_to_date = 0;
        let mut notified = 0;
        let mut failed = 0;
        let mut notices_sent = 0;
        let mut cloned = 0;
        let mut pulled = 0;

        for result in &results {
            match result.refresh() {
                Some(Refresh::Cloned) => cloned += 1,
                Some(Refresh::Pulled) => pulled += 1,
                None => {}
            }

            match result {
                RepoOutcome::UpToDate { .. } => up_to_date += 1,
                RepoOutcome::Notified { notices, .. } => {
                    notified += 1;
                    notices_sent += notices.len();
                }
                RepoOutcome::Failed { sent, .. } => {
                    failed += 1;
                    notices_sent += sent.len();
                }
            }
        }

        Self {
            started_at,
            total_repositories: results.len(),
            up_to_date,
            notified,
            failed,
            notices_sent,
            cloned,
            pulled,
            duration,
            results,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|result| match result {
            RepoOutcome::Failed { name, error, .. } => Some((name.as_str(), error.as_str())),
            _ => None,
        })
    }
}

/// Orchestrates clone/pull, assessment and notification
#[derive(Clone)]
pub struct ReleaseChecker {
    repositories: Arc<Vec<RepositoryConfig>>,
    workspace: Workspace,
    vcs: Arc<dyn VersionControl>,
    notifier: Arc<dyn Notifier>,
}

impl ReleaseChecker {
    pub fn new(
        config: &Config,
        vcs: Arc<dyn VersionControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_parts(
            config.repositories(),
            Workspace::from_config(&config.workspace),
            vcs,
            notifier,
        )
    }

    pub fn with_parts(
        repositories: Vec<RepositoryConfig>,
        workspace: Workspace,
        vcs: Arc<dyn VersionControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repositories: Arc::new(repositories),
            workspace,
            vcs,
            notifier,
        }
    }

    /// Check every configured repository in order
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        info!(
            "Checking {} repositories in {} ({:?} workspace)",
            self.repositories.len(),
            self.workspace.tree().display(),
            self.workspace.policy()
        );

        let _guard = self
            .workspace
            .acquire()
            .context("Failed to prepare workspace")?;

        let mut results = Vec::with_capacity(self.repositories.len());
        for repo in self.repositories.iter() {
            let outcome = self.check_repository(repo).await;
            match &outcome {
                RepoOutcome::Failed { name, error, .. } => error!("{}: {}", name, error),
                other => debug!("Checked {:?}", other),
            }
            results.push(outcome);
        }

        let summary = RunSummary::from_outcomes(results, started_at, start_time.elapsed());

        info!(
            "Run completed in {:.2}s: {} up to date, {} notified, {} failed",
            summary.duration.as_secs_f64(),
            summary.up_to_date,
            summary.notified,
            summary.failed
        );

        Ok(summary)
    }

    /// Check a single repository; never fails, errors become `RepoOutcome::Failed`
    pub async fn check_repository(&self, repo: &RepositoryConfig) -> RepoOutcome {
        let (refresh, observation) = match self.observe(repo).await {
            Ok(observed) => observed,
            Err(e) => {
                return RepoOutcome::Failed {
                    name: repo.name.clone(),
                    error: format!("{:#}", e),
                    sent: Vec::new(),
                }
            }
        };

        info!(
            "{}: commit {} tag {}",
            repo.name,
            observation.commit,
            observation.tag_timestamp()
        );

        let notices = assess(&repo.name, &observation);
        if notices.is_empty() {
            info!("{}: release tags are fine", repo.name);
            return RepoOutcome::UpToDate {
                name: repo.name.clone(),
                refresh,
            };
        }

        let target = NotifyTarget::from(repo);
        let mut sent = Vec::with_capacity(notices.len());
        let mut errors = Vec::new();

        for notice in notices {
            info!("{}", notice.title());
            match self.notifier.notify(&target, &notice).await {
                Ok(()) => sent.push(notice),
                Err(e) => {
                    warn!("{}: notification failed: {:#}", repo.name, e);
                    errors.push(format!("{:#}", e));
                }
            }
        }

        if errors.is_empty() {
            RepoOutcome::Notified {
                name: repo.name.clone(),
                refresh,
                notices: sent,
            }
        } else {
            RepoOutcome::Failed {
                name: repo.name.clone(),
                error: errors.join("; "),
                sent,
            }
        }
    }

    /// Clone or pull, then read commit and tag timestamps
    async fn observe(&self, repo: &RepositoryConfig) -> Result<(Refresh, Observation)> {
        let dir = self.workspace.repo_dir(repo);

        if self.workspace.has_clone(repo) {
            let previous = self
                .vcs
                .latest_tag(&dir)
                .await
                .context("Failed to read tags before pull")?;
            let previous_ts = previous
                .as_ref()
                .map(|tag| tag.timestamp)
                .unwrap_or_default();

            self.vcs.pull(&dir).await?;

            let commit = self.vcs.commit_timestamp(&dir).await?;
            let tag = self.vcs.latest_tag(&dir).await?;
            return Ok((Refresh::Pulled, Observation::refreshed(commit, tag, previous_ts)));
        }

        if dir.exists() {
            // Leftover from an interrupted clone, or a non-persistent workspace
            self.workspace.discard(repo)?;
        }

        if let Err(e) = self.vcs.clone_repo(&repo.clone_url, &dir).await {
            if let Err(cleanup) = self.workspace.discard(repo) {
                warn!("{}: {:#}", repo.name, cleanup);
            }
            return Err(e);
        }

        let commit = self.vcs.commit_timestamp(&dir).await?;
        let tag = self.vcs.latest_tag(&dir).await?;
        Ok((Refresh::Cloned, Observation::fresh(commit, tag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CachePolicy;
    use crate::freshness::{TagState, Timestamp};
    use crate::git::MockVersionControl;
    use crate::notify::MockNotifier;
    use anyhow::anyhow;
    use assert_matches::assert_matches;
    use mockall::Sequence;
    use tempfile::TempDir;

    fn repo(name: &str) -> RepositoryConfig {
        RepositoryConfig {
            name: name.to_string(),
            clone_url: format!("https://example.com/acme/{}.git", name),
            endpoint: "https://hooks.example.com/x".to_string(),
            channel: "#releases".to_string(),
            bot_name: "release-bot".to_string(),
            bot_icon: ":label:".to_string(),
        }
    }

    fn tag(name: &str, ts: i64) -> Option<TagState> {
        Some(TagState {
            name: name.to_string(),
            timestamp: Timestamp(ts),
        })
    }

    fn checker(
        temp: &TempDir,
        repos: Vec<RepositoryConfig>,
        vcs: MockVersionControl,
        notifier: MockNotifier,
    ) -> ReleaseChecker {
        ReleaseChecker::with_parts(
            repos,
            Workspace::new(temp.path().join("ws"), CachePolicy::Persistent),
            Arc::new(vcs),
            Arc::new(notifier),
        )
    }

    #[tokio::test]
    async fn test_fresh_clone_with_unreleased_commit_notifies_once() {
        let temp = TempDir::new().unwrap();
        let mut vcs = MockVersionControl::new();
        vcs.expect_clone_repo().times(1).returning(|_, _| Ok(()));
        vcs.expect_pull().never();
        vcs.expect_commit_timestamp()
            .returning(|_| Ok(Timestamp(100)));
        vcs.expect_latest_tag().returning(|_| Ok(tag("v1.0", 50)));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|target, notice| {
                target.channel == "#releases"
                    && matches!(notice, Notice::NeedsReleaseTag { repository, .. } if repository == "widget")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let summary = checker(&temp, vec![repo("widget")], vcs, notifier)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.total_repositories, 1);
        assert_eq!(summary.notified, 1);
        assert_eq!(summary.notices_sent, 1);
        assert_matches!(
            &summary.results[0],
            RepoOutcome::Notified { refresh: Refresh::Cloned, .. }
        );
    }

    #[tokio::test]
    async fn test_tagged_repository_sends_nothing() {
        let temp = TempDir::new().unwrap();
        let mut vcs = MockVersionControl::new();
        vcs.expect_clone_repo().returning(|_, _| Ok(()));
        vcs.expect_commit_timestamp()
            .returning(|_| Ok(Timestamp(100)));
        vcs.expect_latest_tag().returning(|_| Ok(tag("v1.0", 100)));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let summary = checker(&temp, vec![repo("widget")], vcs, notifier)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.up_to_date, 1);
        assert!(!summary.has_failures());
    }

    #[tokio::test]
    async fn test_existing_clone_takes_pull_path() {
        let temp = TempDir::new().unwrap();
        let widget = repo("widget");
        let ws = Workspace::new(temp.path().join("ws"), CachePolicy::Persistent);
        std::fs::create_dir_all(ws.repo_dir(&widget).join(".git")).unwrap();
        let expected_dir = ws.repo_dir(&widget);

        let mut seq = Sequence::new();
        let mut vcs = MockVersionControl::new();
        vcs.expect_clone_repo().never();
        vcs.expect_latest_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(tag("v1.0", 50)));
        vcs.expect_pull()
            .withf(move |dir| dir == expected_dir.as_path())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        vcs.expect_commit_timestamp()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Timestamp(70)));
        vcs.expect_latest_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(tag("v2.0", 80)));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|_, notice| matches!(notice, Notice::NewTag { tag, .. } if tag == "v2.0"))
            .times(1)
            .returning(|_, _| Ok(()));

        let checker = ReleaseChecker::with_parts(vec![widget], ws, Arc::new(vcs), Arc::new(notifier));
        let summary = checker.run().await.unwrap();

        assert_matches!(
            &summary.results[0],
            RepoOutcome::Notified { refresh: Refresh::Pulled, notices, .. } if notices.len() == 1
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_repositories() {
        let temp = TempDir::new().unwrap();
        let mut vcs = MockVersionControl::new();
        vcs.expect_clone_repo()
            .withf(|url, _| url.contains("broken"))
            .returning(|_, _| Err(anyhow!("repository not found")));
        vcs.expect_clone_repo()
            .withf(|url, _| url.contains("widget"))
            .returning(|_, _| Ok(()));
        vcs.expect_commit_timestamp()
            .returning(|_| Ok(Timestamp(100)));
        vcs.expect_latest_tag().returning(|_| Ok(None));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_, _| Ok(()));

        let summary = checker(&temp, vec![repo("broken"), repo("widget")], vcs, notifier)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.total_repositories, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.notified, 1);
        let failures: Vec<_> = summary.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
        assert!(failures[0].1.contains("repository not found"));
        assert_eq!(summary.results[1].name(), "widget");
    }

    #[tokio::test]
    async fn test_notification_failure_marks_repository_failed() {
        let temp = TempDir::new().unwrap();
        let mut vcs = MockVersionControl::new();
        vcs.expect_clone_repo().returning(|_, _| Ok(()));
        vcs.expect_commit_timestamp()
            .returning(|_| Ok(Timestamp(100)));
        vcs.expect_latest_tag().returning(|_| Ok(tag("v1.0", 50)));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .returning(|_, _| Err(anyhow!("webhook returned 500")));

        let summary = checker(&temp, vec![repo("widget")], vcs, notifier)
            .run()
            .await
            .unwrap();

        assert!(summary.has_failures());
        assert_matches!(
            &summary.results[0],
            RepoOutcome::Failed { error, sent, .. } if error.contains("500") && sent.is_empty()
        );
    }

    #[tokio::test]
    async fn test_timestamp_error_is_isolated() {
        let temp = TempDir::new().unwrap();
        let mut vcs = MockVersionControl::new();
        vcs.expect_clone_repo().returning(|_, _| Ok(()));
        vcs.expect_commit_timestamp()
            .returning(|_| Err(anyhow!("Unexpected date line")));
        vcs.expect_latest_tag().returning(|_| Ok(None));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();

        let outcome = checker(&temp, vec![], vcs, notifier)
            .check_repository(&repo("widget"))
            .await;

        assert!(outcome.is_failure());
    }

    #[test]
    fn test_run_summary_counts() {
        let results = vec![
            RepoOutcome::UpToDate {
                name: "a".to_string(),
                refresh: Refresh::Cloned,
            },
            RepoOutcome::Notified {
                name: "b".to_string(),
                refresh: Refresh::Pulled,
                notices: vec![
                    Notice::NewTag {
                        repository: "b".to_string(),
                        tag: "v2".to_string(),
                    },
                    Notice::NeedsReleaseTag {
                        repository: "b".to_string(),
                        commit: Timestamp(9),
                        tag: Some("v2".to_string()),
                    },
                ],
            },
            RepoOutcome::Failed {
                name: "c".to_string(),
                error: "boom".to_string(),
                sent: Vec::new(),
            },
        ];

        let duration = Duration::from_secs(3);
        let summary = RunSummary::from_outcomes(results, Utc::now(), duration);

        assert_eq!(summary.total_repositories, 3);
        assert_eq!(summary.up_to_date, 1);
        assert_eq!(summary.notified, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.notices_sent, 2);
        assert_eq!(summary.cloned, 1);
        assert_eq!(summary.pulled, 1);
        assert_eq!(summary.duration, duration);
        assert_eq!(summary.results[2].refresh(), None);
    }
}
