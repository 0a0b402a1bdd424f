//! Git context capture
//!
//! Records the commit/branch a memory was created under, enabling queries
//! like "during the last commit" or "on branch X". Everything here degrades
//! silently: not-a-repo or any git2 failure yields empty context.

use std::path::Path;

use chrono::{DateTime, Utc};
use git2::{Repository, StatusOptions};
use serde::{Deserialize, Serialize};

/// Length of abbreviated commit hashes.
const SHORT_HASH_LEN: usize = 8;

/// Current git context for a working directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitContext {
    /// Current commit hash (short)
    pub commit: Option<String>,
    /// Current branch name
    pub branch: Option<String>,
    /// Uncommitted changes present
    pub is_dirty: bool,
    /// When the current commit was made
    pub commit_time: Option<DateTime<Utc>>,
}

/// Information about a single commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Abbreviated hash
    pub hash: String,
    pub full_hash: String,
    pub time: Option<DateTime<Utc>>,
    /// First line of the commit message
    pub subject: String,
}

fn commit_timestamp(commit: &git2::Commit<'_>) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(commit.time().seconds(), 0)
}

/// Capture the current git context for a directory.
///
/// Returns an empty context when the directory is not inside a repository
/// or any lookup fails.
pub fn get_git_context(cwd: &Path) -> GitContext {
    let mut ctx = GitContext::default();

    let Ok(repo) = Repository::discover(cwd) else {
        return ctx;
    };

    if let Ok(head) = repo.head() {
        ctx.branch = head.shorthand().map(String::from);
        if let Ok(commit) = head.peel_to_commit() {
            let full = commit.id().to_string();
            ctx.commit = Some(full[..SHORT_HASH_LEN.min(full.len())].to_string());
            ctx.commit_time = commit_timestamp(&commit);
        }
    }

    let mut options = StatusOptions::new();
    options.include_untracked(true);
    if let Ok(statuses) = repo.statuses(Some(&mut options)) {
        ctx.is_dirty = !statuses.is_empty();
    }

    ctx
}

/// Recent commits, most recent first. Empty on any failure.
pub fn get_recent_commits(count: usize, cwd: &Path) -> Vec<CommitInfo> {
    let Ok(repo) = Repository::discover(cwd) else {
        return Vec::new();
    };

    let Ok(mut revwalk) = repo.revwalk() else {
        return Vec::new();
    };
    if revwalk.push_head().is_err() {
        return Vec::new();
    }

    let mut commits = Vec::new();
    for oid in revwalk.take(count) {
        let Ok(oid) = oid else { break };
        let Ok(commit) = repo.find_commit(oid) else { break };

        let full_hash = commit.id().to_string();
        commits.push(CommitInfo {
            hash: full_hash[..SHORT_HASH_LEN.min(full_hash.len())].to_string(),
            full_hash,
            time: commit_timestamp(&commit),
            subject: commit.summary().unwrap_or("").to_string(),
        });
    }

    commits
}
