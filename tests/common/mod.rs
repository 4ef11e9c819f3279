//! Common test utilities: throwaway git repositories with pinned dates
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use releasetag_reminder::config::{CachePolicy, RepositoryConfig};

/// Base timestamp for fixtures (2021-01-01T00:00:00Z)
pub const BASE: i64 = 1_609_459_200;

/// A non-bare repository used as the clone source
pub struct OriginRepo {
    pub dir: PathBuf,
}

impl OriginRepo {
    pub fn init(parent: &Path, name: &str) -> Self {
        let dir = parent.join(name);
        std::fs::create_dir_all(&dir).expect("Failed to create origin dir");
        git(&dir, &["init", "-q"], None);
        Self { dir }
    }

    pub fn url(&self) -> String {
        self.dir.to_string_lossy().into_owned()
    }

    /// Commit a new file with author and committer date `ts`
    pub fn commit(&self, file: &str, ts: i64) {
        std::fs::write(self.dir.join(file), file).expect("Failed to write file");
        git(&self.dir, &["add", file], None);
        git(&self.dir, &["commit", "-q", "-m", file], Some(ts));
    }

    /// Create an annotated tag whose tagger date is `ts`
    pub fn tag(&self, name: &str, ts: i64) {
        git(&self.dir, &["tag", "-a", name, "-m", name], Some(ts));
    }
}

/// Run git in `dir` with a fixed identity and optional pinned dates (+0900)
pub fn git(dir: &Path, args: &[&str], ts: Option<i64>) {
    let mut command = Command::new("git");
    command
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_COMMITTER_NAME", "Test Author")
        .env("GIT_COMMITTER_EMAIL", "author@example.com");

    if let Some(ts) = ts {
        let date = format!("{} +0900", ts);
        command
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date);
    }

    let output = command.output().expect("Failed to execute git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn repository(name: &str, url: &str, endpoint: &str) -> RepositoryConfig {
    RepositoryConfig {
        name: name.to_string(),
        clone_url: url.to_string(),
        endpoint: endpoint.to_string(),
        channel: "#releases".to_string(),
        bot_name: "release-bot".to_string(),
        bot_icon: ":label:".to_string(),
    }
}

/// Minimal YAML config pointing at `endpoint` with one repository
pub fn config_yaml(endpoint: &str, workspace: &Path, policy: CachePolicy, repos: &[(&str, &str)]) -> String {
    let policy = match policy {
        CachePolicy::Persistent => "persistent",
        CachePolicy::Ephemeral => "ephemeral",
    };

    let mut yaml = format!(
        "default-endpoint: \"{}\"\n\
         default-channel: \"#releases\"\n\
         default-bot-name: \"release-bot\"\n\
         default-bot-icon: \":label:\"\n\
         workspace:\n  directory: \"{}\"\n  policy: {}\n\
         repositories:\n",
        endpoint,
        workspace.display(),
        policy
    );
    for (name, url) in repos {
        yaml.push_str(&format!("  - name: {}\n    clone-url: \"{}\"\n", name, url));
    }
    yaml
}
