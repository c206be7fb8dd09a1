//! Local Git repository operations.
//!
//! Mutations go through the `git` binary (cherry-pick, rerere and conflict
//! reporting only exist there); read-only queries go through `git2`, opening
//! the repository per call so each answer reflects the current on-disk state.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use git2::{Repository, StatusOptions};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::vcs::Vcs;
use crate::errors::GitError;
use crate::models::Remote;

/// [`Vcs`] implementation over a local clone.
#[derive(Debug, Clone)]
pub struct GitClient {
    root: PathBuf,
}

impl GitClient {
    /// Open the repository containing `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let repo = Repository::discover(path)
            .map_err(|_| GitError::RepositoryNotFound(path.display().to_string()))?;
        let root = repo
            .workdir()
            .ok_or_else(|| GitError::RepositoryNotFound(path.display().to_string()))?
            .to_path_buf();
        info!(root = %root.display(), "opened git repository");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open(&self) -> Result<Repository, GitError> {
        Repository::open(&self.root)
            .map_err(|_| GitError::RepositoryNotFound(self.root.display().to_string()))
    }
}

#[async_trait]
impl Vcs for GitClient {
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        if args.is_empty() {
            return Err(GitError::EmptyCommand);
        }

        let mut cmd = Command::new("git");
        cmd.current_dir(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = %format!("git {}", args.join(" ")), "running git command");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound("git".into())
            } else {
                GitError::IoError(e)
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            debug!(exit_code, command = args[0], "git command failed");
            return Err(GitError::CommandFailed {
                command: args[0].to_string(),
                exit_code,
                output: format!("{}{}", stdout, stderr),
            });
        }
        Ok(stdout)
    }

    #[instrument(skip(self))]
    async fn has_local_changes(&self, filter: Option<&str>) -> Result<bool, GitError> {
        let repo = self.open()?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(false)
            .recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut opts))?;

        let changed = statuses.iter().any(|entry| match filter {
            Some(f) => entry.path().is_some_and(|p| p.contains(f)),
            None => true,
        });
        debug!(changed, "checked working tree status");
        Ok(changed)
    }

    async fn current_branch(&self) -> Result<String, GitError> {
        let repo = self.open()?;
        let head = repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| GitError::RefNotFound("HEAD".into()))
    }

    async fn remote_default_branch(&self, remote: &str) -> Result<String, GitError> {
        let repo = self.open()?;
        let head_ref = format!("refs/remotes/{}/HEAD", remote);
        let reference = repo
            .find_reference(&head_ref)
            .map_err(|_| GitError::RefNotFound(head_ref.clone()))?;
        let target = reference
            .symbolic_target()
            .ok_or_else(|| GitError::RefNotFound(head_ref.clone()))?;

        let prefix = format!("refs/remotes/{}/", remote);
        Ok(target.strip_prefix(&prefix).unwrap_or(target).to_string())
    }

    #[instrument(skip(self))]
    async fn branch_exists_in_remote(&self, remote: &str, branch: &str) -> Result<bool, GitError> {
        let out = self.run(&["ls-remote", "--heads", remote, branch]).await?;
        Ok(!out.trim().is_empty())
    }

    async fn list_unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        let repo = self.open()?;
        let index = repo.index()?;
        let mut paths: Vec<String> = Vec::new();

        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            if let Some(entry) = entry {
                let path = String::from_utf8_lossy(&entry.path).to_string();
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        debug!(count = paths.len(), "listed unmerged paths");
        Ok(paths)
    }

    async fn remotes(&self) -> Result<Vec<Remote>, GitError> {
        let repo = self.open()?;
        let names = repo.remotes()?;
        let mut remotes = Vec::new();
        for name in names.iter().flatten() {
            match repo.find_remote(name) {
                Ok(remote) => remotes.push(Remote {
                    name: name.to_string(),
                    url: remote.url().unwrap_or_default().to_string(),
                }),
                Err(e) => warn!(remote = name, error = %e, "could not read remote"),
            }
        }
        Ok(remotes)
    }

    async fn repo_root_dir(&self) -> Result<PathBuf, GitError> {
        Ok(self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{RepositoryInitOptions, Signature};

    fn init_repo(dir: &Path) -> Repository {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        Repository::init_opts(dir, &opts).unwrap()
    }

    fn commit_file(repo: &Repository, name: &str, content: &str) {
        let root = repo.workdir().unwrap().to_path_buf();
        std::fs::write(root.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@test.com").unwrap();
        let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parents)
            .unwrap();
    }

    #[tokio::test]
    async fn test_current_branch_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "a");

        let client = GitClient::new(dir.path()).unwrap();
        assert_eq!(client.current_branch().await.unwrap(), "main");
        assert_eq!(
            client.repo_root_dir().await.unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_has_local_changes_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "a");

        let client = GitClient::new(dir.path()).unwrap();
        assert!(!client.has_local_changes(None).await.unwrap());

        std::fs::write(dir.path().join("rr-notes.txt"), "new").unwrap();
        assert!(client.has_local_changes(None).await.unwrap());
        assert!(client.has_local_changes(Some("rr-")).await.unwrap());
        assert!(!client.has_local_changes(Some("other")).await.unwrap());
    }

    #[tokio::test]
    async fn test_remotes_and_no_unmerged_paths() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "a");
        repo.remote("origin", "https://github.com/acme/widgets.git")
            .unwrap();

        let client = GitClient::new(dir.path()).unwrap();
        let remotes = client.remotes().await.unwrap();
        assert_eq!(
            remotes,
            vec![Remote {
                name: "origin".into(),
                url: "https://github.com/acme/widgets.git".into()
            }]
        );
        assert!(client.list_unmerged_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_remote_default_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "a");

        let client = GitClient::new(dir.path()).unwrap();
        assert!(matches!(
            client.remote_default_branch("origin").await,
            Err(GitError::RefNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let client = GitClient::new(dir.path()).unwrap();
        assert!(matches!(client.run(&[]).await, Err(GitError::EmptyCommand)));
    }

    #[test]
    fn test_repo_not_found() {
        assert!(matches!(
            GitClient::new("/nonexistent/forksync"),
            Err(GitError::RepositoryNotFound(_))
        ));
    }
}
