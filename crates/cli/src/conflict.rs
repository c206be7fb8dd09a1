//! `forksync conflict pull|push`: share the conflict resolution cache.

use anyhow::{Context, Result};

use forksync_core::config::ForkSyncConfig;
use forksync_core::git::GitClient;
use forksync_core::{CacheLocation, ResolutionCache};

use super::style;
use super::CacheArgs;

fn location(config: &ForkSyncConfig, args: &CacheArgs) -> CacheLocation {
    let mut location = config.cache.location();
    if let Some(remote) = &args.remote {
        location.remote = remote.clone();
    }
    if let Some(branch) = &args.branch {
        location.branch = branch.clone();
    }
    if args.keep_branches {
        location.keep_branches = true;
    }
    location
}

pub async fn run_pull(config: &ForkSyncConfig, args: &CacheArgs) -> Result<()> {
    let git = GitClient::new(".").context("failed to open local repository")?;
    let location = location(config, args);
    let pulled = ResolutionCache::new(&git, location.clone())
        .pull()
        .await
        .context("failed to pull conflict resolution cache")?;
    if pulled {
        println!(
            "{}",
            style::success(&format!(
                "Pulled resolutions from {}/{}",
                location.remote, location.branch
            ))
        );
    } else {
        println!("{}", style::warn("No resolution cache on the remote yet"));
    }
    Ok(())
}

pub async fn run_push(config: &ForkSyncConfig, args: &CacheArgs) -> Result<()> {
    let git = GitClient::new(".").context("failed to open local repository")?;
    let location = location(config, args);
    let pushed = ResolutionCache::new(&git, location.clone())
        .push()
        .await
        .context("failed to push conflict resolution cache")?;
    if pushed {
        println!(
            "{}",
            style::success(&format!(
                "Pushed resolutions to {}/{}",
                location.remote, location.branch
            ))
        );
    } else {
        println!("{}", style::warn("Nothing new to push"));
    }
    Ok(())
}
