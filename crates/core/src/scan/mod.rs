//! Patch-set resolution: which fork commits are private patches that still
//! need to be carried on top of upstream.

pub mod commit;
pub mod markers;
pub mod reference;
pub mod resolver;

use serde::Serialize;

pub use commit::{CommentCache, CommitRecord};
pub use markers::{CommitMarker, MarkerSet};
pub use reference::{Reference, ReferenceExtractor};
pub use resolver::{Resolver, ScanRequest};

/// Private commits of a fork, oldest first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PatchSet {
    commits: Vec<CommitRecord>,
}

impl PatchSet {
    /// Build from commits discovered while walking history backwards.
    pub fn from_newest_first(mut commits: Vec<CommitRecord>) -> Self {
        commits.reverse();
        Self { commits }
    }

    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommitRecord> {
        self.commits.iter()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

impl From<Vec<CommitRecord>> for PatchSet {
    /// `commits` must already be oldest first.
    fn from(commits: Vec<CommitRecord>) -> Self {
        Self { commits }
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a CommitRecord;
    type IntoIter = std::slice::Iter<'a, CommitRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.iter()
    }
}
