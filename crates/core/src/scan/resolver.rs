//! The patch-set resolution engine.
//!
//! Walks the fork's history from its head ref, newest first, and decides for
//! each commit whether it is a private patch:
//!
//! 1. merged pull requests containing the commit are collected from both the
//!    fork and upstream;
//! 2. an explicit reference to an upstream pull request is looked up in the
//!    fork pull request bodies, then the commit message, then the commit's
//!    review comments; the first source with a reference wins;
//! 3. a reference to a merged upstream pull request means the change already
//!    landed upstream, so the commit is dropped;
//! 4. a `SYNC_IGNORE` marker drops the commit as well;
//! 5. the walk stops at the first commit that would be picked but whose only
//!    pull request is a merged upstream one: everything older is upstream
//!    history. Dropped commits never stop the walk.

use tracing::{debug, info, warn};

use super::commit::CommitRecord;
use super::markers::{self, CommitMarker};
use super::reference::{is_ambiguous, ReferenceExtractor};
use super::PatchSet;
use crate::errors::ScanError;
use crate::git::host::{self, CodeHost};
use crate::models::{PullRequestState, RepoName};
use crate::sequence::DEFAULT_PER_PAGE;

/// Fork and upstream coordinates of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub fork_org: String,
    pub fork_repo: String,
    pub fork_head_ref: String,
    pub upstream_org: String,
    pub upstream_repo: String,
}

impl ScanRequest {
    pub fn new(fork: &RepoName, fork_head_ref: impl Into<String>, upstream: &RepoName) -> Self {
        Self {
            fork_org: fork.owner.clone(),
            fork_repo: fork.repo.clone(),
            fork_head_ref: fork_head_ref.into(),
            upstream_org: upstream.owner.clone(),
            upstream_repo: upstream.repo.clone(),
        }
    }

    pub fn fork(&self) -> RepoName {
        RepoName::new(&self.fork_org, &self.fork_repo)
    }

    pub fn upstream(&self) -> RepoName {
        RepoName::new(&self.upstream_org, &self.upstream_repo)
    }

    /// Reports every missing field at once.
    pub fn validate(&self) -> Result<(), ScanError> {
        let checks = [
            (&self.upstream_org, "must define upstream organization"),
            (&self.upstream_repo, "must define upstream repository"),
            (&self.fork_org, "must define fork's organization"),
            (&self.fork_repo, "must define fork's repository"),
            (&self.fork_head_ref, "must define fork's head ref"),
        ];
        let problems: Vec<&str> = checks
            .iter()
            .filter(|(value, _)| value.trim().is_empty())
            .map(|(_, problem)| *problem)
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ScanError::InvalidRequest(problems.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Pick,
    Drop,
}

/// Computes the [`PatchSet`] of a fork against its upstream.
pub struct Resolver<'h, H: CodeHost + ?Sized> {
    host: &'h H,
    markers: Vec<CommitMarker>,
    per_page: usize,
    web_url: String,
}

impl<'h, H: CodeHost + ?Sized> Resolver<'h, H> {
    /// `markers` is the catalog of markers recognised in messages and comments.
    pub fn new(host: &'h H, markers: &[CommitMarker]) -> Self {
        Self {
            host,
            markers: markers.to_vec(),
            per_page: DEFAULT_PER_PAGE,
            web_url: "https://github.com".into(),
        }
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Base URL used in error messages pointing at pull requests and commits.
    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        self.web_url = web_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn resolve(&self, req: &ScanRequest) -> Result<PatchSet, ScanError> {
        req.validate()?;
        let fork = req.fork();
        let upstream = req.upstream();
        let extractor = ReferenceExtractor::new(&upstream)?;
        info!(fork = %fork, upstream = %upstream, head = %req.fork_head_ref, "initiating fork scan");

        let mut walk = host::commits(self.host, &fork, &req.fork_head_ref, self.per_page);
        let mut picked = Vec::new();
        while let Some(commit) = walk.next().await? {
            let mut record = CommitRecord::new(commit);
            let verdict = self
                .scan_commit(&mut record, &fork, &upstream, &extractor)
                .await?;

            if verdict == Verdict::Drop {
                continue;
            }
            if is_upstream_boundary(&record, &upstream) {
                debug!(sha = %record.short_sha(), "commit is only part of a merged upstream pull request, stopping");
                break;
            }
            picked.push(record);
        }

        info!(fork = %fork, upstream = %upstream, picked = picked.len(), "finished fork scan");
        Ok(PatchSet::from_newest_first(picked))
    }

    async fn scan_commit(
        &self,
        record: &mut CommitRecord,
        fork: &RepoName,
        upstream: &RepoName,
        extractor: &ReferenceExtractor,
    ) -> Result<Verdict, ScanError> {
        info!(sha = %record.short_sha(), title = %record.title(), "scanning commit");

        let mut prs = host::merged_pull_requests(self.host, fork, &record.sha, self.per_page)
            .collect_all()
            .await?;
        match host::merged_pull_requests(self.host, upstream, &record.sha, self.per_page)
            .collect_all()
            .await
        {
            Ok(upstream_prs) => prs.extend(upstream_prs),
            Err(e) if e.is_not_found() => {
                debug!(error = %e, "commit not found in upstream repository");
            }
            Err(e) => return Err(e.into()),
        }
        record.pull_requests = prs;

        let reference = self.find_reference(record, fork, extractor).await?;
        match reference {
            Some(number) => {
                debug!(upstream = %upstream, number, "checking referenced pull request");
                let pr = self.host.pull_request(upstream, number).await?;
                if pr.is_merged() {
                    info!(number, "referenced pull request is merged, skipping commit");
                    return Ok(Verdict::Drop);
                }
                match pr.state {
                    PullRequestState::Closed => {
                        info!(number, "referenced pull request is closed, picking commit")
                    }
                    PullRequestState::Open => {
                        info!(number, "referenced pull request is open or draft, picking commit")
                    }
                }
            }
            None => info!("no reference to upstream found for commit"),
        }

        let comments: Vec<String> = record
            .comments(self.host, fork, self.per_page)
            .await?
            .iter()
            .map(|c| c.body.clone())
            .collect();
        record.markers = markers::detect(
            &self.markers,
            std::iter::once(record.message.as_str()).chain(comments.iter().map(String::as_str)),
        );
        if record.has_marker(CommitMarker::Ignore) {
            info!(marker = %CommitMarker::Ignore, "detected ignore marker, skipping commit");
            return Ok(Verdict::Drop);
        }

        if reference.is_none() && record.pull_requests.is_empty() {
            warn!(sha = %record.short_sha(), "no metadata found for picked commit");
        }
        Ok(Verdict::Pick)
    }

    /// Upstream pull request number referenced by the commit, if any.
    async fn find_reference(
        &self,
        record: &mut CommitRecord,
        fork: &RepoName,
        extractor: &ReferenceExtractor,
    ) -> Result<Option<u64>, ScanError> {
        for pr in record.pull_requests_of(fork) {
            let refs = extractor.extract(&pr.body)?;
            if is_ambiguous(&refs) {
                return Err(ambiguous(
                    "pull request body",
                    format!("{}/{}/pull/{}", self.web_url, fork, pr.number),
                    &refs,
                ));
            }
            if let Some(first) = refs.first() {
                info!(pr = pr.number, "found reference in pull request body");
                return Ok(Some(first.number));
            }
        }

        let commit_url = format!("{}/{}/commit/{}", self.web_url, fork, record.sha);

        let refs = extractor.extract(&record.message)?;
        if is_ambiguous(&refs) {
            return Err(ambiguous("commit message", commit_url, &refs));
        }
        if let Some(first) = refs.first() {
            info!(sha = %record.short_sha(), "found reference in commit message");
            return Ok(Some(first.number));
        }

        for comment in record.comments(self.host, fork, self.per_page).await? {
            let refs = extractor.extract(&comment.body)?;
            if is_ambiguous(&refs) {
                return Err(ambiguous("commit comment", commit_url, &refs));
            }
            if let Some(first) = refs.first() {
                info!("found reference in commit comment");
                return Ok(Some(first.number));
            }
        }

        Ok(None)
    }
}

fn ambiguous(source_kind: &str, url: String, refs: &[super::Reference]) -> ScanError {
    let mut numbers: Vec<u64> = Vec::new();
    for r in refs {
        if !numbers.contains(&r.number) {
            numbers.push(r.number);
        }
    }
    ScanError::AmbiguousReference {
        source_kind: source_kind.into(),
        url,
        numbers,
    }
}

/// The commit was only ever part of one merged upstream pull request.
fn is_upstream_boundary(record: &CommitRecord, upstream: &RepoName) -> bool {
    match record.pull_requests.as_slice() {
        [only] => only.belongs_to(upstream) && only.is_merged(),
        _ => false,
    }
}
