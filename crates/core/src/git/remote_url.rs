//! Host-aware remote URL derivation and matching.
//!
//! The upstream is fetched through a temporary remote whose URL is built
//! from the web base URL, which itself is derived from the configured API
//! URL unless given explicitly. The same normalisation is used to check that
//! `origin` really points at the fork.

use crate::models::RepoName;

/// Derive the web base URL (used for clone URLs and links).
///
/// Resolution order:
/// 1. If `web_url` is `Some(non-empty)`, use it as the base.
/// 2. Otherwise derive from `api_url`:
///    - `https://api.github.com` → `https://github.com`
///    - `https://<host>/api/v3`  → `https://<host>`
///    - Anything else            → strip trailing slash, use as-is
pub fn derive_web_base_url(api_url: &str, web_url: Option<&str>) -> String {
    if let Some(explicit) = web_url {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return trimmed.trim_end_matches('/').to_string();
        }
    }

    let url = api_url.trim().trim_end_matches('/');

    if url.eq_ignore_ascii_case("https://api.github.com") {
        return "https://github.com".to_string();
    }

    if let Some(base) = url.strip_suffix("/api/v3") {
        return base.to_string();
    }

    url.to_string()
}

/// URL the temporary upstream remote is created with: `{web}/{owner}/{repo}`.
pub fn repo_web_url(web_base: &str, repo: &RepoName) -> String {
    format!("{}/{}", web_base.trim_end_matches('/'), repo)
}

/// Whether a remote URL (HTTPS, SSH or scp-like) designates `repo`.
///
/// Comparison ignores a trailing `.git`, trailing slashes and ASCII case.
pub fn remote_points_at(url: &str, repo: &RepoName) -> bool {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url).to_ascii_lowercase();
    let wanted = repo.to_string().to_ascii_lowercase();

    match url.strip_suffix(&wanted) {
        // `https://host/owner/repo`, `ssh://git@host/owner/repo`, `git@host:owner/repo`
        Some(prefix) => prefix.ends_with('/') || prefix.ends_with(':'),
        None => false,
    }
}
