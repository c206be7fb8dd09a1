//! One fork commit as seen by the scanner.

use serde::Serialize;
use tracing::debug;

use super::markers::MarkerSet;
use crate::errors::GitHubError;
use crate::git::host::{self, CodeHost};
use crate::models::{CommitComment, HostedCommit, PullRequestRef, RepoName};

/// Review comments of one commit, fetched from one repository.
#[derive(Debug, Clone)]
pub struct CommentCache {
    pub repo: RepoName,
    pub comments: Vec<CommitComment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    /// Merged pull requests known to contain the commit, fork first.
    pub pull_requests: Vec<PullRequestRef>,
    pub markers: MarkerSet,
    #[serde(skip)]
    comments: Option<CommentCache>,
}

impl CommitRecord {
    pub fn new(commit: HostedCommit) -> Self {
        Self {
            sha: commit.sha,
            message: commit.message,
            author: commit.author,
            pull_requests: Vec::new(),
            markers: MarkerSet::new(),
            comments: None,
        }
    }

    /// First line of the message.
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    pub fn short_sha(&self) -> &str {
        self.sha.get(..8).unwrap_or(&self.sha)
    }

    pub fn pull_requests_of<'a>(
        &'a self,
        repo: &'a RepoName,
    ) -> impl Iterator<Item = &'a PullRequestRef> + 'a {
        self.pull_requests.iter().filter(move |pr| pr.belongs_to(repo))
    }

    pub fn has_marker(&self, marker: super::CommitMarker) -> bool {
        self.markers.contains(&marker)
    }

    /// Review comments left on the commit in `repo`. Fetched at most once per
    /// repository; asking for another repository replaces the memo.
    pub async fn comments<H>(
        &mut self,
        host: &H,
        repo: &RepoName,
        per_page: usize,
    ) -> Result<&[CommitComment], GitHubError>
    where
        H: CodeHost + ?Sized,
    {
        let cached = matches!(&self.comments, Some(cache) if &cache.repo == repo);
        if !cached {
            debug!(sha = %self.sha, repo = %repo, "fetching commit comments");
            let comments = host::commit_comments(host, repo, &self.sha, per_page)
                .collect_all()
                .await?;
            self.comments = Some(CommentCache {
                repo: repo.clone(),
                comments,
            });
        }
        Ok(self
            .comments
            .as_ref()
            .map(|cache| cache.comments.as_slice())
            .unwrap_or_default())
    }
}
