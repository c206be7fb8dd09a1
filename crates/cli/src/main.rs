//! forksync command-line tool.
//!
//! Provides subcommands for scanning a fork for private patches, replaying
//! them onto a new upstream revision, sharing the conflict resolution cache,
//! and explaining commit markers and conflict recovery.

mod conflict;
mod explain;
mod style;
mod sync;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use forksync_core::config::{ForkSyncConfig, CONFIG_TEMPLATE};
use forksync_core::models::RepoName;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "forksync.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Keep a private fork in sync with its upstream.
#[derive(Parser, Debug)]
#[command(
    name = "forksync",
    version,
    about = "Replay a fork's private patches on top of its upstream"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the fork's private commits not yet merged upstream.
    Scan {
        #[command(flatten)]
        repos: RepoArgs,

        /// Print the patch set as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Replay the fork's private commits onto an upstream ref.
    Sync {
        #[command(flatten)]
        repos: RepoArgs,

        /// Print the cherry-picks that would run, without touching the repo.
        #[arg(long)]
        dry_run: bool,

        /// Pull the conflict resolution cache before, and push it after.
        #[arg(long)]
        with_cache: bool,
    },

    /// Manage the shared conflict resolution cache.
    Conflict {
        #[command(subcommand)]
        action: ConflictAction,
    },

    /// Describe commit markers or conflict recovery.
    Explain {
        #[command(subcommand)]
        topic: ExplainTopic,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },
}

/// Fork and upstream coordinates; each falls back to the config file.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// The fork in the form <org>/<repo>.
    #[arg(short = 'r', long)]
    pub fork_repo: Option<RepoName>,

    /// Head ref of the fork from which commits are scanned.
    #[arg(short = 'c', long)]
    pub fork_head: Option<String>,

    /// The upstream repository in the form <org>/<repo>.
    #[arg(short = 'R', long)]
    pub upstream_repo: Option<RepoName>,

    /// Upstream ref (branch, tag or commit) to replay onto.
    #[arg(short = 'C', long)]
    pub upstream_head: Option<String>,

    /// The fork's output branch.
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConflictAction {
    /// Pull the latest conflict resolutions into `.git/rr-cache`.
    Pull(CacheArgs),
    /// Push local conflict resolutions to the cache branch.
    Push(CacheArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Remote holding the cache branch.
    #[arg(short, long)]
    pub remote: Option<String>,

    /// Name of the cache branch.
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Keep temporary local branches after the command.
    #[arg(long)]
    pub keep_branches: bool,
}

#[derive(Subcommand, Debug)]
enum ExplainTopic {
    /// Commit markers and their effect.
    Markers,
    /// Conflict kinds and how each is recovered.
    Conflicts,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Explain { topic } => {
            match topic {
                ExplainTopic::Markers => explain::run_markers(),
                ExplainTopic::Conflicts => explain::run_conflicts(),
            }
            Ok(())
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            match command {
                Commands::Scan { repos, json } => sync::run_scan(&config, &repos, json).await,
                Commands::Sync {
                    repos,
                    dry_run,
                    with_cache,
                } => sync::run_sync(&config, &repos, dry_run, with_cache).await,
                Commands::Conflict { action } => match action {
                    ConflictAction::Pull(args) => conflict::run_pull(&config, &args).await,
                    ConflictAction::Push(args) => conflict::run_push(&config, &args).await,
                },
                Commands::Init { .. } | Commands::Explain { .. } => Ok(()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load the given file, or `forksync.toml` when present, or defaults.
fn load_config(path: Option<&Path>) -> Result<ForkSyncConfig> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };
    debug!(path = ?path, "loading configuration");
    let mut config = match path {
        Some(path) => ForkSyncConfig::load_from_file(&path)
            .with_context(|| format!("failed to load configuration file {}", path.display()))?,
        None => ForkSyncConfig::default(),
    };
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!(
                "{}",
                style::warn("Init cancelled. Existing file was not modified.")
            );
            return Ok(());
        }
    }

    std::fs::write(output, CONFIG_TEMPLATE).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!(
            "Default configuration written to {}",
            output.display()
        ))
    );
    println!();
    println!("Next steps:");
    println!("  1. Fill in the [fork] and [upstream] repositories");
    println!("  2. Export a GitHub token in the variable named by github.token_env");
    println!("  3. Preview with: forksync sync --dry-run --config {}", output.display());
    println!();

    Ok(())
}
