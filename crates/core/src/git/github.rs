//! GitHub REST API client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::host::CodeHost;
use crate::errors::GitHubError;
use crate::models::{CommitComment, HostedCommit, PullRequestRef, PullRequestState, RepoName};
use crate::sequence::Page;

#[derive(Debug, Clone, Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetail,
    author: Option<GitHubUserSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubCommitDetail {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubUserSummary {
    login: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PullRequest {
    number: u64,
    html_url: String,
    state: PullRequestState,
    body: Option<String>,
    merged_at: Option<DateTime<Utc>>,
    base: PullRequestBase,
}

#[derive(Debug, Clone, Deserialize)]
struct PullRequestBase {
    repo: Option<GitHubRepoSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubRepoSummary {
    full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubComment {
    body: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl From<GitHubCommit> for HostedCommit {
    fn from(c: GitHubCommit) -> Self {
        Self {
            sha: c.sha,
            message: c.commit.message,
            author: c.author.map(|a| a.login),
        }
    }
}

impl PullRequest {
    /// The owning repository is the base repository; `queried` is used when
    /// GitHub no longer reports it (deleted repositories).
    fn into_ref(self, queried: &RepoName) -> PullRequestRef {
        let repo = self
            .base
            .repo
            .and_then(|r| r.full_name.parse().ok())
            .unwrap_or_else(|| queried.clone());
        PullRequestRef {
            repo,
            number: self.number,
            state: self.state,
            merged_at: self.merged_at,
            body: self.body.unwrap_or_default(),
            html_url: self.html_url,
        }
    }
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Build a client for `api_url`. Without a token requests are anonymous
    /// and subject to the much lower unauthenticated rate limit.
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("forksync/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, authenticated = token.is_some(), "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        let resp = self.get(url).query(query).send().await?;
        let resp = check_response(resp).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| GitHubError::ParseError(e.to_string()))
    }
}

fn page_query(page: Page) -> [(&'static str, String); 2] {
    [
        ("per_page", page.per_page.to_string()),
        ("page", page.number.to_string()),
    ]
}

#[async_trait]
impl CodeHost for GitHubClient {
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn list_commits(
        &self,
        repo: &RepoName,
        head: &str,
        page: Page,
    ) -> Result<Vec<HostedCommit>, GitHubError> {
        let url = format!("{}/repos/{}/commits", self.api_url, repo);
        let mut query = vec![("sha", head.to_string())];
        query.extend(page_query(page));
        let commits: Vec<GitHubCommit> = self.get_json(&url, &query).await?;
        debug!(count = commits.len(), page = page.number, "fetched commits");
        Ok(commits.into_iter().map(HostedCommit::from).collect())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn pull_requests_for_commit(
        &self,
        repo: &RepoName,
        sha: &str,
        page: Page,
    ) -> Result<Vec<PullRequestRef>, GitHubError> {
        let url = format!("{}/repos/{}/commits/{}/pulls", self.api_url, repo, sha);
        let prs: Vec<PullRequest> = self.get_json(&url, &page_query(page)).await?;
        debug!(count = prs.len(), "fetched pull requests for commit");
        Ok(prs.into_iter().map(|pr| pr.into_ref(repo)).collect())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn pull_request(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<PullRequestRef, GitHubError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_url, repo, number);
        let pr: PullRequest = self.get_json(&url, &[]).await?;
        debug!(number = pr.number, state = %pr.state, merged = pr.merged_at.is_some(), "fetched pull request");
        Ok(pr.into_ref(repo))
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn commit_comments(
        &self,
        repo: &RepoName,
        sha: &str,
        page: Page,
    ) -> Result<Vec<CommitComment>, GitHubError> {
        let url = format!("{}/repos/{}/commits/{}/comments", self.api_url, repo, sha);
        let comments: Vec<GitHubComment> = self.get_json(&url, &page_query(page)).await?;
        debug!(count = comments.len(), "fetched commit comments");
        Ok(comments
            .into_iter()
            .map(|c| CommitComment { body: c.body })
            .collect())
    }
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 401 {
        return Err(GitHubError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    let remaining = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if status.as_u16() == 429 || (status.as_u16() == 403 && remaining.as_deref() == Some("0")) {
        let reset = resp
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(GitHubError::RateLimited { reset_at: reset });
    }
    if status.as_u16() == 403 {
        return Err(GitHubError::AuthenticationFailed(format!("HTTP {}", status)));
    }

    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or_else(|_| format!("HTTP {}", status));
    Err(GitHubError::ApiError {
        status: status.as_u16(),
        body,
    })
}
