//! Shares the `git rerere` resolution cache across clones through a
//! dedicated branch of the fork's remote.
//!
//! The branch holds a copy of `.git/rr-cache` under its base name. Pulling
//! copies it into the local `.git` directory; pushing copies the local cache
//! onto the branch and pushes it when anything changed. Both work from a
//! temporary local branch and return to the starting branch afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::CacheError;
use crate::git::Vcs;

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "forksync-rerere-cache";
pub const DEFAULT_DIR: &str = ".git/rr-cache";

const README: &str = "\n# DO NOT EDIT\n\nGenerated and automatically managed by forksync.\n";

/// Where the cache lives on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLocation {
    pub remote: String,
    pub branch: String,
    /// Local directory, relative to the repository root.
    pub dir: PathBuf,
    /// Keep the temporary local branch around after the command.
    pub keep_branches: bool,
}

impl Default for CacheLocation {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.into(),
            branch: DEFAULT_BRANCH.into(),
            dir: PathBuf::from(DEFAULT_DIR),
            keep_branches: false,
        }
    }
}

impl CacheLocation {
    pub fn temp_branch(&self) -> String {
        format!("tmp-forksync-{}", self.branch)
    }

    /// Name of the directory on the cache branch.
    fn branch_dir(&self) -> PathBuf {
        self.dir
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.dir.clone())
    }
}

pub struct ResolutionCache<'v, V: Vcs + ?Sized> {
    vcs: &'v V,
    location: CacheLocation,
}

impl<'v, V: Vcs + ?Sized> ResolutionCache<'v, V> {
    pub fn new(vcs: &'v V, location: CacheLocation) -> Self {
        Self { vcs, location }
    }

    pub fn location(&self) -> &CacheLocation {
        &self.location
    }

    /// Bring the remote cache into the local one and enable `rerere`.
    /// Returns `false` when the remote has no cache branch yet.
    pub async fn pull(&self) -> Result<bool, CacheError> {
        self.require_clean().await?;
        let (home, exists) = self.enter().await?;
        let result = self.pull_on_branch(exists).await;
        self.leave(&home).await;
        result
    }

    /// Publish the local cache. Returns `false` when there was nothing new.
    pub async fn push(&self) -> Result<bool, CacheError> {
        self.require_clean().await?;
        let (home, _) = self.enter().await?;
        let result = self.push_on_branch().await;
        self.leave(&home).await;
        result
    }

    async fn pull_on_branch(&self, exists: bool) -> Result<bool, CacheError> {
        if !exists {
            warn!(
                remote = %self.location.remote,
                branch = %self.location.branch,
                "cache branch not existing on remote, nothing to pull"
            );
            return Ok(false);
        }
        let root = self.vcs.repo_root_dir().await?;
        let from = root.join(self.location.branch_dir());
        let to = root.join(&self.location.dir);
        if from.exists() {
            info!(from = %from.display(), to = %to.display(), "copying cached resolutions");
            let copied = copy_tree(&from, &to)?;
            debug!(copied, "files copied");
        } else {
            warn!(path = %from.display(), "cache branch holds no resolutions");
        }
        self.vcs.set_config("rerere.enabled", "true").await?;
        Ok(true)
    }

    async fn push_on_branch(&self) -> Result<bool, CacheError> {
        let root = self.vcs.repo_root_dir().await?;
        let from = root.join(&self.location.dir);
        if !from.exists() {
            warn!(path = %from.display(), "no local resolutions found, skipping");
            return Ok(false);
        }
        let branch_dir = self.location.branch_dir();
        let branch_dir = branch_dir.to_string_lossy();
        info!(from = %from.display(), "copying local resolutions");
        copy_tree(&from, &root.join(branch_dir.as_ref()))?;

        if !self.vcs.has_local_changes(Some(branch_dir.as_ref())).await? {
            warn!("nothing to push due to no changes detected, skipping");
            return Ok(false);
        }

        let result = self.publish(&branch_dir).await;
        if let Err(e) = self.vcs.reset_hard().await {
            warn!(error = %e, "could not clean up working tree");
        }
        result.map(|()| true)
    }

    async fn publish(&self, branch_dir: &str) -> Result<(), CacheError> {
        info!("committing latest resolutions");
        self.vcs.stage(branch_dir).await?;
        self.vcs
            .commit_message("update: new conflict resolutions")
            .await?;
        info!(remote = %self.location.remote, branch = %self.location.branch, "pushing");
        let refspec = format!("{}:{}", self.location.temp_branch(), self.location.branch);
        self.vcs.push(&self.location.remote, &refspec).await?;
        Ok(())
    }

    async fn require_clean(&self) -> Result<(), CacheError> {
        if self.vcs.has_local_changes(None).await? {
            return Err(CacheError::DirtyWorkingTree);
        }
        Ok(())
    }

    /// Check out the temporary branch. Returns the branch to come back to
    /// and whether the cache branch exists on the remote.
    async fn enter(&self) -> Result<(String, bool), CacheError> {
        let temp = self.location.temp_branch();
        let remote = &self.location.remote;
        info!(branch = %temp, "moving into local branch");

        let mut home = self.vcs.current_branch().await?;
        let exists = self
            .vcs
            .branch_exists_in_remote(remote, &self.location.branch)
            .await?;

        if home == temp {
            debug!("already on the local branch, moving to the default one");
            let default = self.vcs.remote_default_branch(remote).await?;
            self.vcs.checkout(&default).await?;
            home = default;
        }

        if let Err(e) = self.vcs.delete_branch(&temp).await {
            debug!(branch = %temp, error = %e, "purposely ignoring error");
        }

        if exists {
            self.vcs.fetch_branch(remote, &self.location.branch).await?;
            let start = format!("{}/{}", remote, self.location.branch);
            self.vcs.create_branch(&temp, &start).await?;
        } else if let Err(e) = self.create_orphan(&temp).await {
            if let Err(reset) = self.vcs.reset_hard().await {
                warn!(error = %reset, "could not reset working tree");
            }
            self.leave(&home).await;
            return Err(e);
        }
        Ok((home, exists))
    }

    /// A history-less branch holding only a README.
    async fn create_orphan(&self, name: &str) -> Result<(), CacheError> {
        self.vcs.run(&["checkout", "--orphan", name]).await?;
        self.vcs.reset_hard().await?;
        let root = self.vcs.repo_root_dir().await?;
        let readme = root.join("README.md");
        fs::write(&readme, README).map_err(|e| CacheError::CopyFailed {
            from: "README".into(),
            to: readme.display().to_string(),
            detail: e.to_string(),
        })?;
        self.vcs.stage("README.md").await?;
        self.vcs.commit_message("new: initial commit").await?;
        Ok(())
    }

    /// Go back to `home` and drop the temporary branch unless asked to keep
    /// it. Failures are logged only.
    async fn leave(&self, home: &str) {
        if let Err(e) = self.vcs.checkout(home).await {
            warn!(branch = home, error = %e, "could not check out original branch");
            return;
        }
        if !self.location.keep_branches {
            let temp = self.location.temp_branch();
            if let Err(e) = self.vcs.delete_branch(&temp).await {
                warn!(branch = %temp, error = %e, "could not delete temporary branch");
            }
        }
    }
}

/// Recursively copy `from` into `to`, replacing files that already exist.
/// Returns the number of files copied.
fn copy_tree(from: &Path, to: &Path) -> Result<usize, CacheError> {
    let failed = |detail: String| CacheError::CopyFailed {
        from: from.display().to_string(),
        to: to.display().to_string(),
        detail,
    };

    let mut copied = 0;
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| failed(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| failed(e.to_string()))?;
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| failed(e.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                failed(format!("{}: {}", entry.path().display(), e))
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
