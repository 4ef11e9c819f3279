//! Freshness comparison - decides which notices a repository deserves
//!
//! Timestamps here are whatever the extractor in [`crate::git`] produced. They
//! are only meaningful relative to each other, never as wall-clock time.

use std::fmt;

/// Ordering key derived from a raw `git show --date=raw` date line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Stand-in for "no commit" / "no tag"
    pub const ZERO: Timestamp = Timestamp(0);
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The most recently created tag of a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagState {
    pub name: String,
    pub timestamp: Timestamp,
}

/// Everything the comparator needs to know about one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Timestamp of the tip commit
    pub commit: Timestamp,
    /// Latest tag after clone/pull, if the repository has any
    pub tag: Option<TagState>,
    /// Latest tag timestamp before the pull; `None` on a fresh clone
    pub previous_tag: Option<Timestamp>,
}

impl Observation {
    /// Observation for a repository that was just cloned
    pub fn fresh(commit: Timestamp, tag: Option<TagState>) -> Self {
        Self {
            commit,
            tag,
            previous_tag: None,
        }
    }

    /// Observation for an existing clone that was refreshed with a pull
    pub fn refreshed(commit: Timestamp, tag: Option<TagState>, previous_tag: Timestamp) -> Self {
        Self {
            commit,
            tag,
            previous_tag: Some(previous_tag),
        }
    }

    pub fn tag_timestamp(&self) -> Timestamp {
        self.tag
            .as_ref()
            .map(|tag| tag.timestamp)
            .unwrap_or(Timestamp::ZERO)
    }
}

/// A message worth sending to the repository's webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The tip commit is newer than the latest tag
    NeedsReleaseTag {
        repository: String,
        commit: Timestamp,
        tag: Option<String>,
    },
    /// A tag appeared since the previous run
    NewTag { repository: String, tag: String },
}

impl Notice {
    pub fn repository(&self) -> &str {
        match self {
            Notice::NeedsReleaseTag { repository, .. } | Notice::NewTag { repository, .. } => {
                repository
            }
        }
    }

    pub fn title(&self) -> String {
        match self {
            Notice::NeedsReleaseTag { repository, .. } => {
                format!("{} needs a release tag", repository)
            }
            Notice::NewTag { repository, tag } => {
                format!("{}: new tag {} was created", repository, tag)
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notice::NeedsReleaseTag { tag: Some(tag), .. } => {
                format!("There are commits newer than {}. Please tag a release.", tag)
            }
            Notice::NeedsReleaseTag { tag: None, .. } => {
                "This repository has no tags yet. Please tag a release.".to_string()
            }
            Notice::NewTag { tag, .. } => format!("Release {} is out.", tag),
        }
    }
}

/// Decide which notices `repository` should get for `observation`.
///
/// Pure: the same inputs always produce the same notices. The new-tag check
/// only runs when a previous tag timestamp is known; the commit-vs-tag check
/// always runs, against the post-pull tag. Both comparisons are strict.
pub fn assess(repository: &str, observation: &Observation) -> Vec<Notice> {
    let mut notices = Vec::new();
    let tag_timestamp = observation.tag_timestamp();

    if let (Some(previous), Some(tag)) = (observation.previous_tag, &observation.tag) {
        if previous < tag.timestamp {
            notices.push(Notice::NewTag {
                repository: repository.to_string(),
                tag: tag.name.clone(),
            });
        }
    }

    if observation.commit > tag_timestamp {
        notices.push(Notice::NeedsReleaseTag {
            repository: repository.to_string(),
            commit: observation.commit,
            tag: observation.tag.as_ref().map(|tag| tag.name.clone()),
        });
    }

    notices
}
