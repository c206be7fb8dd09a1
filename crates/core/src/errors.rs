//! Error types for the forksync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::conflict::ConflictSuggestion;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from local Git operations (the `git` binary and `git2`).
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The path is not inside a git repository.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A `git` command exited with a non-zero status. `output` holds the
    /// combined stdout and stderr, which is where conflict reports live.
    #[error("git {command} failed (exit {exit_code}): {output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// An empty argument list was passed to the runner.
    #[error("attempted executing an empty git command")]
    EmptyCommand,

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited {
        reset_at: String,
    },

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

impl GitHubError {
    /// Whether the API answered that the requested object does not exist
    /// (404) or cannot be looked up in that repository (422).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404 | 422, .. })
    }
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

/// Errors from the patch-set resolution engine.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A required request field is missing or malformed.
    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    /// One text source referenced more than one upstream pull request.
    #[error("{source_kind} contains multiple upstream repo refs and may be ambiguous: {url}")]
    AmbiguousReference {
        source_kind: String,
        url: String,
        numbers: Vec<u64>,
    },

    /// A reference number could not be parsed.
    #[error("malformed pull request reference '{0}'")]
    MalformedReference(String),

    /// Underlying GitHub error during the scan.
    #[error("scan GitHub error: {0}")]
    GitHubError(#[from] GitHubError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from conflict classification and recovery.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The report holds conflict shapes the classifier does not know.
    #[error("unknown conflicts encountered ({content} content, {non_content} non-content, {total} total), can't recover: {report}")]
    UnknownConflicts {
        content: usize,
        non_content: usize,
        total: usize,
        report: String,
    },

    /// A recovery action failed against the working tree.
    #[error("could not recover from {kind} conflict: {source}")]
    RecoveryFailed {
        kind: String,
        #[source]
        source: GitError,
    },

    /// A conflict report pattern failed to compile.
    #[error("invalid {kind} conflict pattern: {detail}")]
    InvalidPattern { kind: String, detail: String },

    /// A `git diff --check` line did not have the expected shape.
    #[error("can't parse content conflict line: {0}")]
    MalformedCheckLine(String),

    /// After recovery, the unmerged paths don't match the content conflicts.
    #[error("found {found} unmerged files but expected {expected}: {}", paths.join(","))]
    UnmergedMismatch {
        found: usize,
        expected: usize,
        paths: Vec<String>,
    },

    /// Underlying Git error during recovery.
    #[error("conflict Git error: {0}")]
    GitError(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Replay errors
// ---------------------------------------------------------------------------

/// Errors from the replay orchestrator.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A required request field is missing or malformed.
    #[error("invalid replay request: {0}")]
    InvalidRequest(String),

    /// The working tree has uncommitted changes.
    #[error("local changes must be stashed, committed, or removed")]
    DirtyWorkingTree,

    /// `origin` is missing or is not the fork.
    #[error("current repo `origin` remote does not match the fork's one: {0}")]
    OriginMismatch(String),

    /// A conflict could be classified but nothing resolves it.
    #[error("unrecoverable merge conflict while picking {sha}")]
    UnrecoverableConflict {
        sha: String,
        suggestion: Box<ConflictSuggestion>,
    },

    /// Recovery failed for a commit.
    #[error("conflict recovery failed while picking {sha}: {source}")]
    RecoveryFailed {
        sha: String,
        #[source]
        source: ConflictError,
    },

    /// A Git command failed while picking a commit, outside of recovery.
    #[error("failed picking {sha}: {source}")]
    PickFailed {
        sha: String,
        #[source]
        source: GitError,
    },

    /// Underlying Git error during the replay.
    #[error("replay Git error: {0}")]
    GitError(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Resolution cache errors
// ---------------------------------------------------------------------------

/// Errors from the branch-backed resolution cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The working tree has uncommitted changes.
    #[error("local changes must be stashed, committed, or removed")]
    DirtyWorkingTree,

    /// Copying the cache directory failed.
    #[error("failed to copy '{from}' to '{to}': {detail}")]
    CopyFailed {
        from: String,
        to: String,
        detail: String,
    },

    /// Underlying Git error.
    #[error("cache Git error: {0}")]
    GitError(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
