//! Replay orchestrator.
//!
//! The [`Replayer`] cherry-picks a [`PatchSet`] onto a fresh branch cut from
//! an upstream ref, recovering from conflicts as it goes:
//!
//! 1. Require a clean working tree and an `origin` that is the fork.
//! 2. Add a temporary remote for upstream and fetch it with tags.
//! 3. Recreate the output branch from the upstream ref.
//! 4. Pick every commit, oldest first. A failed pick goes through conflict
//!    recovery driven by the commit's markers, then is committed.
//! 5. Remove the temporary remote, leaving the output branch checked out.
//!
//! Any failure while picking resets the tree and returns to the branch the
//! run started from.

use std::fmt;
use std::io::Write;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::conflict::classifier::CONFLICT_PREFIX;
use crate::conflict::{
    Classifier, ConflictKind, Recovery, RecoveryOutcome, RecoveryPolicy, SuggestionContext,
};
use crate::errors::{GitError, ReplayError};
use crate::git::remote_url::{remote_points_at, repo_web_url};
use crate::git::Vcs;
use crate::models::RepoName;
use crate::scan::{CommitRecord, PatchSet};

/// Name of the disposable remote pointing at upstream.
pub const TEMP_REMOTE: &str = "tmp-forksync-upstream";

const ORIGIN: &str = "origin";

// ---------------------------------------------------------------------------
// Request & state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRequest {
    pub upstream: RepoName,
    /// Branch, tag or commit of upstream to replay onto.
    pub upstream_ref: String,
    pub fork: RepoName,
    /// Output branch, recreated from scratch.
    pub branch: String,
}

impl ReplayRequest {
    pub fn validate(&self) -> Result<(), ReplayError> {
        let mut problems = Vec::new();
        if self.upstream_ref.trim().is_empty() {
            problems.push("must define upstream head ref");
        }
        if self.branch.trim().is_empty() {
            problems.push("must define name of the sync branch in fork");
        }
        if self.branch == TEMP_REMOTE {
            problems.push("sync branch can't be named after the temporary remote");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReplayError::InvalidRequest(problems.join("; ")))
        }
    }
}

/// Where a replay currently is. Indexes are positions in the patch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayState {
    Prepared,
    Replaying(usize),
    Conflict(usize),
    Recovering(usize),
    Done,
    Aborted,
}

impl fmt::Display for ReplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepared => write!(f, "prepared"),
            Self::Replaying(i) => write!(f, "replaying({})", i),
            Self::Conflict(i) => write!(f, "conflict({})", i),
            Self::Recovering(i) => write!(f, "recovering({})", i),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Summary of a successful replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub branch: String,
    /// Commits picked, recovered ones included.
    pub applied: usize,
    /// SHAs of the commits that needed conflict recovery.
    pub recovered: Vec<String>,
}

// ---------------------------------------------------------------------------
// Replayer
// ---------------------------------------------------------------------------

pub struct Replayer<'v, V: Vcs + ?Sized> {
    vcs: &'v V,
    web_url: String,
    upstream_url: Option<String>,
    conflict_kinds: Vec<ConflictKind>,
    state: ReplayState,
}

impl<'v, V: Vcs + ?Sized> Replayer<'v, V> {
    /// `web_url` is the code host's web base (e.g. `https://github.com`),
    /// used for the upstream remote URL and in conflict suggestions.
    pub fn new(vcs: &'v V, web_url: impl Into<String>) -> Self {
        Self {
            vcs,
            web_url: web_url.into().trim_end_matches('/').to_string(),
            upstream_url: None,
            conflict_kinds: ConflictKind::ALL.to_vec(),
            state: ReplayState::Prepared,
        }
    }

    /// Fetch upstream from `url` instead of its web URL.
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = Some(url.into());
        self
    }

    /// Restrict the conflict kinds recovery knows about.
    pub fn with_conflict_kinds(mut self, kinds: &[ConflictKind]) -> Self {
        self.conflict_kinds = kinds.to_vec();
        self
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Print the commands a replay would run, in order. Touches nothing.
    pub fn dry_run(&self, patches: &PatchSet, out: &mut dyn Write) -> std::io::Result<()> {
        for commit in patches {
            writeln!(out, "{}", dry_run_line(commit))?;
        }
        Ok(())
    }

    pub async fn replay(
        &mut self,
        request: &ReplayRequest,
        patches: &PatchSet,
    ) -> Result<ReplayReport, ReplayError> {
        self.transition(ReplayState::Prepared);
        request.validate()?;
        info!(
            fork = %request.fork,
            upstream = %request.upstream,
            upstream_ref = %request.upstream_ref,
            branch = %request.branch,
            commits = patches.len(),
            "initiating fork sync"
        );

        if self.vcs.has_local_changes(None).await? {
            return Err(ReplayError::DirtyWorkingTree);
        }
        self.check_origin(&request.fork).await?;

        let remotes = self.vcs.remotes().await?;
        if remotes.iter().any(|r| r.name == TEMP_REMOTE) {
            info!(remote = TEMP_REMOTE, "removing stale temporary remote");
            self.vcs.remove_remote(TEMP_REMOTE).await?;
        }
        let url = self
            .upstream_url
            .clone()
            .unwrap_or_else(|| repo_web_url(&self.web_url, &request.upstream));
        debug!(remote = TEMP_REMOTE, url = %url, "adding temporary remote");
        self.vcs.add_remote(TEMP_REMOTE, &url).await?;

        let result = self.replay_with_remote(request, patches).await;

        if let Err(e) = self.vcs.remove_remote(TEMP_REMOTE).await {
            warn!(remote = TEMP_REMOTE, error = %e, "could not remove temporary remote");
        }
        match &result {
            Ok(report) => {
                self.transition(ReplayState::Done);
                info!(
                    branch = %report.branch,
                    applied = report.applied,
                    recovered = report.recovered.len(),
                    "finished fork sync"
                );
            }
            Err(e) => {
                self.transition(ReplayState::Aborted);
                error!(error = %e, "fork sync aborted");
            }
        }
        result
    }

    async fn check_origin(&self, fork: &RepoName) -> Result<(), ReplayError> {
        let remotes = self.vcs.remotes().await?;
        let origin = remotes
            .iter()
            .find(|r| r.name == ORIGIN)
            .ok_or_else(|| ReplayError::OriginMismatch("no `origin` remote".into()))?;
        if !remote_points_at(&origin.url, fork) {
            return Err(ReplayError::OriginMismatch(format!(
                "expected {}, found {}",
                fork, origin.url
            )));
        }
        Ok(())
    }

    async fn replay_with_remote(
        &mut self,
        request: &ReplayRequest,
        patches: &PatchSet,
    ) -> Result<ReplayReport, ReplayError> {
        info!(remote = TEMP_REMOTE, "fetching upstream");
        self.vcs.fetch_with_tags(TEMP_REMOTE).await?;

        let start = if self
            .vcs
            .branch_exists_in_remote(TEMP_REMOTE, &request.upstream_ref)
            .await?
        {
            format!("{}/{}", TEMP_REMOTE, request.upstream_ref)
        } else {
            request.upstream_ref.clone()
        };

        let mut home = self.vcs.current_branch().await?;
        if home == request.branch {
            let default = self.vcs.remote_default_branch(ORIGIN).await?;
            info!(branch = %default, "moving off the output branch");
            self.vcs.checkout(&default).await?;
            home = default;
        }

        if let Err(e) = self.vcs.delete_branch(&request.branch).await {
            debug!(branch = %request.branch, error = %e, "purposely ignoring error");
        }
        info!(branch = %request.branch, start = %start, "creating sync branch");
        self.vcs.create_branch(&request.branch, &start).await?;

        let context = SuggestionContext {
            upstream: request.upstream.clone(),
            upstream_ref: request.upstream_ref.clone(),
            fork: request.fork.clone(),
            branch: request.branch.clone(),
            web_url: self.web_url.clone(),
        };

        let mut report = ReplayReport {
            branch: request.branch.clone(),
            ..Default::default()
        };
        for (i, commit) in patches.iter().enumerate() {
            self.transition(ReplayState::Replaying(i));
            match self.pick(i, commit, &context).await {
                Ok(recovered) => {
                    report.applied += 1;
                    if recovered {
                        report.recovered.push(commit.sha.clone());
                    }
                }
                Err(e) => {
                    self.restore(&home).await;
                    return Err(e);
                }
            }
        }
        Ok(report)
    }

    /// Pick one commit. Returns whether conflict recovery was needed.
    async fn pick(
        &mut self,
        index: usize,
        commit: &CommitRecord,
        context: &SuggestionContext,
    ) -> Result<bool, ReplayError> {
        info!(sha = commit.short_sha(), title = commit.title(), "picking");
        let report = match self.vcs.cherry_pick(&commit.sha).await {
            Ok(_) => return Ok(false),
            Err(GitError::CommandFailed { output, .. }) if output.contains(CONFLICT_PREFIX) => {
                output
            }
            // Not a conflict (unknown object, locked index): nothing to recover.
            Err(e) => {
                return Err(ReplayError::PickFailed {
                    sha: commit.sha.clone(),
                    source: e,
                })
            }
        };

        self.transition(ReplayState::Conflict(index));
        warn!(sha = commit.short_sha(), "cherry-pick stopped on conflicts");
        self.transition(ReplayState::Recovering(index));

        let classifier = Classifier::new(&self.conflict_kinds).map_err(|e| {
            ReplayError::RecoveryFailed {
                sha: commit.sha.clone(),
                source: e,
            }
        })?;
        let policy = RecoveryPolicy::from_markers(&commit.markers);
        let outcome = Recovery::new(self.vcs, classifier)
            .recover(&report, policy, context, &commit.sha)
            .await
            .map_err(|e| ReplayError::RecoveryFailed {
                sha: commit.sha.clone(),
                source: e,
            })?;

        match outcome {
            RecoveryOutcome::Resolved => {
                self.vcs
                    .commit_no_edit()
                    .await
                    .map_err(|e| ReplayError::PickFailed {
                        sha: commit.sha.clone(),
                        source: e,
                    })?;
                info!(sha = commit.short_sha(), "conflicts recovered");
                Ok(true)
            }
            RecoveryOutcome::Unrecoverable(suggestion) => Err(ReplayError::UnrecoverableConflict {
                sha: commit.sha.clone(),
                suggestion,
            }),
        }
    }

    /// Undo a half-done pick and go back where the run started. Failures
    /// are logged; the caller is already propagating the original error.
    async fn restore(&mut self, home: &str) {
        info!("reverting cherry-pick");
        if let Err(e) = self.vcs.reset_hard().await {
            warn!(error = %e, "could not reset working tree");
        }
        if let Err(e) = self.vcs.checkout(home).await {
            warn!(branch = home, error = %e, "could not check out original branch");
        }
    }

    fn transition(&mut self, next: ReplayState) {
        debug!(from = %self.state, to = %next, "replay state");
        self.state = next;
    }
}

/// `git cherry-pick <sha> # <title>`
pub fn dry_run_line(commit: &CommitRecord) -> String {
    format!("git cherry-pick {} # {}", commit.sha, commit.title())
}
