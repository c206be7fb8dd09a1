//! The version-control capability used by the replay orchestrator, the
//! conflict recovery engine and the resolution cache.
//!
//! Implementors provide a raw [`Vcs::run`] plus a handful of read-only
//! queries; every mutation is a default method built on `run` so that test
//! doubles only need to record argument lists.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::GitError;
use crate::models::Remote;

/// Which side of a conflicted path to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The branch being replayed onto (upstream during a cherry-pick).
    Ours,
    /// The commit being picked (the fork).
    Theirs,
}

impl Side {
    fn flag(self) -> &'static str {
        match self {
            Self::Ours => "--ours",
            Self::Theirs => "--theirs",
        }
    }
}

#[async_trait]
pub trait Vcs: Send + Sync {
    /// Run `git <args>` in the repository. On a non-zero exit the error
    /// carries the combined stdout and stderr.
    async fn run(&self, args: &[&str]) -> Result<String, GitError>;

    /// Whether the working tree has staged, unstaged or untracked changes.
    /// With a filter, only paths containing it are considered.
    async fn has_local_changes(&self, filter: Option<&str>) -> Result<bool, GitError>;

    /// Short name of the checked-out branch.
    async fn current_branch(&self) -> Result<String, GitError>;

    /// Default branch of `remote`, as recorded by `refs/remotes/<remote>/HEAD`.
    async fn remote_default_branch(&self, remote: &str) -> Result<String, GitError>;

    async fn branch_exists_in_remote(&self, remote: &str, branch: &str) -> Result<bool, GitError>;

    /// Paths with unresolved index entries, each listed once.
    async fn list_unmerged_paths(&self) -> Result<Vec<String>, GitError>;

    async fn remotes(&self) -> Result<Vec<Remote>, GitError>;

    async fn repo_root_dir(&self) -> Result<PathBuf, GitError>;

    // -- Intents ------------------------------------------------------------

    async fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run(&["remote", "add", name, url]).await.map(drop)
    }

    async fn remove_remote(&self, name: &str) -> Result<(), GitError> {
        self.run(&["remote", "remove", name]).await.map(drop)
    }

    async fn fetch_with_tags(&self, remote: &str) -> Result<(), GitError> {
        self.run(&["fetch", "--tags", remote]).await.map(drop)
    }

    async fn fetch_branch(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(&["fetch", remote, branch]).await.map(drop)
    }

    async fn checkout(&self, reference: &str) -> Result<(), GitError> {
        self.run(&["checkout", reference]).await.map(drop)
    }

    /// `checkout -b <name> <start>`
    async fn create_branch(&self, name: &str, start: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-b", name, start]).await.map(drop)
    }

    async fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["branch", "-D", name]).await.map(drop)
    }

    async fn cherry_pick(&self, sha: &str) -> Result<String, GitError> {
        self.run(&["cherry-pick", "--allow-empty", "--keep-redundant-commits", sha])
            .await
    }

    /// Conclude an interrupted cherry-pick with its original message.
    async fn commit_no_edit(&self) -> Result<(), GitError> {
        self.run(&["commit", "--allow-empty", "--no-edit"]).await.map(drop)
    }

    async fn commit_message(&self, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "-m", message]).await.map(drop)
    }

    async fn stage(&self, path: &str) -> Result<(), GitError> {
        self.run(&["add", path]).await.map(drop)
    }

    async fn stage_all(&self) -> Result<(), GitError> {
        self.run(&["add", "-A"]).await.map(drop)
    }

    async fn remove(&self, path: &str) -> Result<(), GitError> {
        self.run(&["rm", "-f", path]).await.map(drop)
    }

    async fn choose_side(&self, side: Side, path: &str) -> Result<(), GitError> {
        self.run(&["checkout", side.flag(), path]).await.map(drop)
    }

    async fn reset_hard(&self) -> Result<(), GitError> {
        self.run(&["reset", "--hard"]).await.map(drop)
    }

    async fn push(&self, remote: &str, refspec: &str) -> Result<(), GitError> {
        self.run(&["push", remote, refspec]).await.map(drop)
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run(&["config", key, value]).await.map(drop)
    }

    /// Output of `git diff --check`: one `path:line: problem` entry per
    /// leftover conflict marker or whitespace error. `git` exits non-zero
    /// when it finds any, so a failure that produced output is the answer.
    async fn diff_check(&self) -> Result<String, GitError> {
        match self.run(&["diff", "--check"]).await {
            Ok(out) => Ok(out),
            Err(GitError::CommandFailed { output, .. }) if !output.trim().is_empty() => {
                Ok(output)
            }
            Err(e) => Err(e),
        }
    }
}
