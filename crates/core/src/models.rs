//! Domain model types shared by the scanner, the replay orchestrator and the
//! CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository names
// ---------------------------------------------------------------------------

/// A hosted repository written `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName {
    pub owner: String,
    pub repo: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(owner, repo))
            }
            _ => Err(format!("'{}' is not in 'owner/repo' format", s)),
        }
    }
}

impl TryFrom<String> for RepoName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoName> for String {
    fn from(value: RepoName) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Pull requests
// ---------------------------------------------------------------------------

/// Pull request state as reported by the code host. Drafts are `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

impl fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A pull request known to contain (or referenced by) a fork commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Full name of the repository owning the pull request.
    pub repo: RepoName,
    pub number: u64,
    pub state: PullRequestState,
    pub merged_at: Option<DateTime<Utc>>,
    pub body: String,
    pub html_url: String,
}

impl PullRequestRef {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }

    pub fn belongs_to(&self, repo: &RepoName) -> bool {
        &self.repo == repo
    }
}

// ---------------------------------------------------------------------------
// Hosted commits and comments
// ---------------------------------------------------------------------------

/// A commit as listed by the code host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedCommit {
    pub sha: String,
    pub message: String,
    /// Login of the author, when the host could map the commit to an account.
    pub author: Option<String>,
}

/// A review comment left on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitComment {
    pub body: String,
}

// ---------------------------------------------------------------------------
// Local repository
// ---------------------------------------------------------------------------

/// A configured remote of the local clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}
