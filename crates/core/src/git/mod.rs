//! Version-control and code-hosting collaborators.

pub mod client;
pub mod github;
pub mod host;
pub mod remote_url;
pub mod vcs;

pub use client::GitClient;
pub use github::GitHubClient;
pub use host::CodeHost;
pub use vcs::{Side, Vcs};
