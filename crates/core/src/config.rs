//! TOML-based configuration for forksync.
//!
//! Every value is optional in the file; command-line flags override it. The
//! GitHub token is never stored in the file: `github.token_env` names the
//! environment variable it is read from, resolved at runtime via
//! [`ForkSyncConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::git::remote_url::derive_web_base_url;
use crate::models::RepoName;
use crate::resolution_cache::{self, CacheLocation};
use crate::sequence::DEFAULT_PER_PAGE;

/// Commented starting point written by `forksync init`.
pub const CONFIG_TEMPLATE: &str = r#"# forksync configuration. Every value can be overridden from the command line.

[github]
# REST API base URL. GitHub Enterprise uses https://<host>/api/v3.
api_url = "https://api.github.com"
# Web base URL, derived from api_url when omitted.
# web_url = "https://github.com"
# Environment variable holding the access token.
token_env = "GITHUB_TOKEN"
# Page size for paginated API calls (1-100).
per_page = 100

[fork]
# repo = "acme/libs"
# head = "master"

[upstream]
# repo = "falcosecurity/libs"
# head = "0.14.0"

[sync]
# Output branch the patch set is replayed onto.
# branch = "sync/0.14.0"

[cache]
# Remote and branch sharing the conflict resolution cache.
remote = "origin"
branch = "forksync-rerere-cache"
dir = ".git/rr-cache"
keep_branches = false
"#;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForkSyncConfig {
    #[serde(default)]
    pub github: GitHubConfig,

    /// The fork being synchronized.
    #[serde(default)]
    pub fork: RepoConfig,

    /// The project it was forked from.
    #[serde(default)]
    pub upstream: RepoConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Conflict resolution cache sharing.
    #[serde(default)]
    pub cache: CacheConfig,
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Web base URL for links and clone URLs. Derived from `api_url` if unset.
    #[serde(default)]
    pub web_url: Option<String>,

    /// Environment variable holding the GitHub personal access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            web_url: None,
            token_env: default_token_env(),
            per_page: default_per_page(),
            token: None,
        }
    }
}

impl GitHubConfig {
    pub fn web_base_url(&self) -> String {
        derive_web_base_url(&self.api_url, self.web_url.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Repositories & sync
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Repository in `owner/repo` format.
    #[serde(default)]
    pub repo: Option<RepoName>,

    /// Branch, tag or commit.
    #[serde(default)]
    pub head: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub branch: Option<String>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_remote")]
    pub remote: String,

    #[serde(default = "default_cache_branch")]
    pub branch: String,

    /// Local cache directory, relative to the repository root.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub keep_branches: bool,
}

fn default_cache_remote() -> String {
    resolution_cache::DEFAULT_REMOTE.into()
}
fn default_cache_branch() -> String {
    resolution_cache::DEFAULT_BRANCH.into()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(resolution_cache::DEFAULT_DIR)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            remote: default_cache_remote(),
            branch: default_cache_branch(),
            dir: default_cache_dir(),
            keep_branches: false,
        }
    }
}

impl CacheConfig {
    pub fn location(&self) -> CacheLocation {
        CacheLocation {
            remote: self.remote.clone(),
            branch: self.branch.clone(),
            dir: self.dir.clone(),
            keep_branches: self.keep_branches,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl ForkSyncConfig {
    /// Load a [`ForkSyncConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ForkSyncConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Read the GitHub token from the variable named by `github.token_env`.
    /// A missing variable logs a warning; unauthenticated calls still work
    /// against public repositories.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
        Ok(())
    }

    /// Validate that every present value is sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api_url = self.github.api_url.trim();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "github.api_url".into(),
                detail: "must be an http(s) URL".into(),
            });
        }
        if self.github.token_env.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.token_env".into(),
                detail: "environment variable name must not be empty".into(),
            });
        }
        if self.github.per_page == 0 || self.github.per_page > 100 {
            return Err(ConfigError::InvalidValue {
                field: "github.per_page".into(),
                detail: "page size must be between 1 and 100".into(),
            });
        }
        let names = [
            ("fork.head", self.fork.head.as_deref()),
            ("upstream.head", self.upstream.head.as_deref()),
            ("sync.branch", self.sync.branch.as_deref()),
            ("cache.remote", Some(self.cache.remote.as_str())),
            ("cache.branch", Some(self.cache.branch.as_str())),
        ];
        for (field, value) in names {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: field.into(),
                        detail: "must not be empty".into(),
                    });
                }
            }
        }
        if self.cache.dir.as_os_str().is_empty() || self.cache.dir.is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "cache.dir".into(),
                detail: "must be a path relative to the repository root".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
