//! The code-hosting capability the patch-set resolution engine scans
//! through, and lazy [`Sequence`]s over its paginated listings.

use async_trait::async_trait;

use crate::errors::GitHubError;
use crate::models::{CommitComment, HostedCommit, PullRequestRef, RepoName};
use crate::sequence::{Page, Sequence};

#[async_trait]
pub trait CodeHost: Send + Sync {
    /// One page of commits reachable from `head`, newest first.
    async fn list_commits(
        &self,
        repo: &RepoName,
        head: &str,
        page: Page,
    ) -> Result<Vec<HostedCommit>, GitHubError>;

    /// One page of pull requests (in `repo`) containing `sha`.
    async fn pull_requests_for_commit(
        &self,
        repo: &RepoName,
        sha: &str,
        page: Page,
    ) -> Result<Vec<PullRequestRef>, GitHubError>;

    async fn pull_request(&self, repo: &RepoName, number: u64)
        -> Result<PullRequestRef, GitHubError>;

    /// One page of review comments left on `sha`.
    async fn commit_comments(
        &self,
        repo: &RepoName,
        sha: &str,
        page: Page,
    ) -> Result<Vec<CommitComment>, GitHubError>;
}

/// All commits reachable from `head`, newest first.
pub fn commits<'a, H>(
    host: &'a H,
    repo: &RepoName,
    head: &str,
    per_page: usize,
) -> Sequence<'a, HostedCommit>
where
    H: CodeHost + ?Sized,
{
    let repo = repo.clone();
    let head = head.to_string();
    Sequence::new(per_page, move |page| {
        let repo = repo.clone();
        let head = head.clone();
        Box::pin(async move { host.list_commits(&repo, &head, page).await })
    })
}

/// Merged pull requests of `repo` containing `sha`.
pub fn merged_pull_requests<'a, H>(
    host: &'a H,
    repo: &RepoName,
    sha: &str,
    per_page: usize,
) -> Sequence<'a, PullRequestRef>
where
    H: CodeHost + ?Sized,
{
    let repo = repo.clone();
    let sha = sha.to_string();
    Sequence::new(per_page, move |page| {
        let repo = repo.clone();
        let sha = sha.clone();
        Box::pin(async move { host.pull_requests_for_commit(&repo, &sha, page).await })
    })
    .filter(PullRequestRef::is_merged)
}

pub fn commit_comments<'a, H>(
    host: &'a H,
    repo: &RepoName,
    sha: &str,
    per_page: usize,
) -> Sequence<'a, CommitComment>
where
    H: CodeHost + ?Sized,
{
    let repo = repo.clone();
    let sha = sha.to_string();
    Sequence::new(per_page, move |page| {
        let repo = repo.clone();
        let sha = sha.clone();
        Box::pin(async move { host.commit_comments(&repo, &sha, page).await })
    })
}
