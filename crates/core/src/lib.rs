//! forksync core library.
//!
//! This crate keeps a private fork in step with its upstream project: it
//! scans the fork's history for private patches, replays them onto a new
//! upstream revision, recovers from merge conflicts as directed by commit
//! markers, and shares conflict resolutions across clones.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod models;
pub mod replay;
pub mod resolution_cache;
pub mod scan;
pub mod sequence;

#[cfg(test)]
mod fakes;

// Re-exports for convenience.
pub use config::ForkSyncConfig;
pub use errors::CoreError;
pub use replay::{ReplayReport, ReplayRequest, Replayer};
pub use resolution_cache::{CacheLocation, ResolutionCache};
pub use scan::{PatchSet, Resolver, ScanRequest};
