//! Commit markers: keywords placed in a commit message or in a review comment
//! to steer how the commit is scanned and replayed.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CommitMarker {
    /// Leave the commit out of the patch set.
    #[serde(rename = "SYNC_IGNORE")]
    Ignore,
    /// On conflict, keep the upstream side.
    #[serde(rename = "SYNC_CONFLICT_SKIP")]
    ConflictSkip,
    /// On conflict, keep the fork side.
    #[serde(rename = "SYNC_CONFLICT_APPLY")]
    ConflictApply,
}

impl CommitMarker {
    pub const ALL: &'static [CommitMarker] = &[
        CommitMarker::Ignore,
        CommitMarker::ConflictSkip,
        CommitMarker::ConflictApply,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "SYNC_IGNORE",
            Self::ConflictSkip => "SYNC_CONFLICT_SKIP",
            Self::ConflictApply => "SYNC_CONFLICT_APPLY",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Ignore => "The commit is left out of the patch set, as if it was already upstream.",
            Self::ConflictSkip => {
                "On merge conflicts the upstream side wins: the commit's changes to the \
                 conflicting paths are dropped."
            }
            Self::ConflictApply => {
                "On merge conflicts the fork side wins: the commit's changes to the \
                 conflicting paths are kept."
            }
        }
    }
}

impl fmt::Display for CommitMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type MarkerSet = BTreeSet<CommitMarker>;

/// Markers from `catalog` appearing verbatim in any of `texts`.
pub fn detect<'t, I>(catalog: &[CommitMarker], texts: I) -> MarkerSet
where
    I: IntoIterator<Item = &'t str>,
{
    let mut found = MarkerSet::new();
    for text in texts {
        for marker in catalog {
            if text.contains(marker.as_str()) {
                found.insert(*marker);
            }
        }
    }
    found
}
