//! `forksync scan` and `forksync sync`.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use forksync_core::config::ForkSyncConfig;
use forksync_core::errors::ReplayError;
use forksync_core::git::{GitClient, GitHubClient};
use forksync_core::models::RepoName;
use forksync_core::replay::dry_run_line;
use forksync_core::scan::{CommitMarker, PatchSet, Resolver, ScanRequest};
use forksync_core::{ReplayRequest, Replayer, ResolutionCache};

use super::style;
use super::RepoArgs;

/// Coordinates merged from flags and the config file, flags winning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub fork: RepoName,
    pub fork_head: String,
    pub upstream: RepoName,
    pub upstream_head: Option<String>,
    pub branch: Option<String>,
}

impl Coordinates {
    /// Every missing value is reported at once.
    pub fn resolve(config: &ForkSyncConfig, args: &RepoArgs, need_sync: bool) -> Result<Self> {
        let fork = args.fork_repo.clone().or_else(|| config.fork.repo.clone());
        let fork_head = args.fork_head.clone().or_else(|| config.fork.head.clone());
        let upstream = args
            .upstream_repo
            .clone()
            .or_else(|| config.upstream.repo.clone());
        let upstream_head = args
            .upstream_head
            .clone()
            .or_else(|| config.upstream.head.clone());
        let branch = args.branch.clone().or_else(|| config.sync.branch.clone());

        let mut missing = Vec::new();
        if upstream.is_none() {
            missing.push("upstream repository (--upstream-repo)");
        }
        if fork.is_none() {
            missing.push("fork's repository (--fork-repo)");
        }
        if fork_head.is_none() {
            missing.push("fork's head ref (--fork-head)");
        }
        if need_sync && upstream_head.is_none() {
            missing.push("upstream head ref (--upstream-head)");
        }
        if need_sync && branch.is_none() {
            missing.push("name of the sync branch in fork (--branch)");
        }

        match (fork, fork_head, upstream) {
            (Some(fork), Some(fork_head), Some(upstream)) if missing.is_empty() => Ok(Self {
                fork,
                fork_head,
                upstream,
                upstream_head,
                branch,
            }),
            _ => anyhow::bail!("must define {}", missing.join(", ")),
        }
    }

    pub fn scan_request(&self) -> ScanRequest {
        ScanRequest::new(&self.fork, self.fork_head.clone(), &self.upstream)
    }
}

async fn resolve_patches(config: &ForkSyncConfig, coords: &Coordinates) -> Result<PatchSet> {
    let host = GitHubClient::new(&config.github.api_url, config.github.token.clone())
        .context("failed to create GitHub client")?;
    let resolver = Resolver::new(&host, CommitMarker::ALL)
        .with_per_page(config.github.per_page)
        .with_web_url(config.github.web_base_url());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(format!(
        "Scanning {} against {}...",
        coords.fork, coords.upstream
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = resolver.resolve(&coords.scan_request()).await;
    spinner.finish_and_clear();
    result.context("failed to scan fork")
}

pub async fn run_scan(config: &ForkSyncConfig, args: &RepoArgs, json: bool) -> Result<()> {
    let coords = Coordinates::resolve(config, args, false)?;
    let patches = resolve_patches(config, &coords).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &patches).context("failed to encode patch set")?;
        writeln!(out)?;
    } else {
        for commit in &patches {
            writeln!(out, "{}", dry_run_line(commit))?;
        }
    }
    Ok(())
}

pub async fn run_sync(
    config: &ForkSyncConfig,
    args: &RepoArgs,
    dry_run: bool,
    with_cache: bool,
) -> Result<()> {
    let coords = Coordinates::resolve(config, args, true)?;
    let request = ReplayRequest {
        upstream: coords.upstream.clone(),
        upstream_ref: coords.upstream_head.clone().unwrap_or_default(),
        fork: coords.fork.clone(),
        branch: coords.branch.clone().unwrap_or_default(),
    };
    request.validate()?;

    let git = GitClient::new(".").context("failed to open the fork's local repository")?;
    let patches = resolve_patches(config, &coords).await?;
    let mut replayer = Replayer::new(&git, config.github.web_base_url());

    if dry_run {
        info!(commits = patches.len(), "dry run, not touching the repository");
        let stdout = std::io::stdout();
        replayer.dry_run(&patches, &mut stdout.lock())?;
        return Ok(());
    }

    let cache = ResolutionCache::new(&git, config.cache.location());
    if with_cache {
        cache
            .pull()
            .await
            .context("failed to pull conflict resolution cache")?;
    }

    let report = match replayer.replay(&request, &patches).await {
        Ok(report) => report,
        Err(ReplayError::UnrecoverableConflict { sha, suggestion }) => {
            println!("{}", suggestion);
            anyhow::bail!("unrecoverable merge conflict while picking {}", sha);
        }
        Err(e) => return Err(e).context("failed to sync fork"),
    };

    if with_cache {
        cache
            .push()
            .await
            .context("failed to push conflict resolution cache")?;
    }

    eprintln!();
    eprintln!(
        "{}",
        style::success(&format!(
            "Synced {} commit(s) onto branch '{}'",
            report.applied, report.branch
        ))
    );
    if !report.recovered.is_empty() {
        eprintln!(
            "{}",
            style::warn(&format!(
                "{} commit(s) needed conflict recovery: {}",
                report.recovered.len(),
                report.recovered.join(", ")
            ))
        );
    }
    Ok(())
}
