//! Merge conflict classification and recovery.
//!
//! The conflict subsystem is responsible for:
//! 1. **Classification** -- reading the report of a failed cherry-pick and
//!    turning it into typed [`ConflictItem`]s.
//! 2. **Recovery** -- resolving each item against the working tree, following
//!    the commit's markers.
//! 3. **Suggestion** -- telling the user how to finish by hand when nothing
//!    resolves a conflict.

pub mod classifier;
pub mod recovery;
pub mod suggestion;

use std::fmt;

use serde::Serialize;

use crate::scan::{CommitMarker, MarkerSet};

pub use classifier::{Classification, Classifier};
pub use recovery::Recovery;
pub use suggestion::{ConflictSuggestion, SuggestionContext};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The canonical conflict shapes `git` reports. During a cherry-pick `HEAD`
/// is the upstream-based branch and the picked commit is the fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Content,
    DeleteModify,
    DeleteRename,
    RenameRename,
    RenameDelete,
    ModifyDelete,
}

impl ConflictKind {
    pub const ALL: &'static [ConflictKind] = &[
        ConflictKind::Content,
        ConflictKind::DeleteModify,
        ConflictKind::DeleteRename,
        ConflictKind::RenameRename,
        ConflictKind::RenameDelete,
        ConflictKind::ModifyDelete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::DeleteModify => "delete/modify",
            Self::DeleteRename => "delete/rename",
            Self::RenameRename => "rename/rename",
            Self::RenameDelete => "rename/delete",
            Self::ModifyDelete => "modify/delete",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Content => "Upstream and the fork changed the same lines of a file.",
            Self::DeleteModify => "Upstream deleted a file the fork modified.",
            Self::DeleteRename => "Upstream deleted a file the fork renamed.",
            Self::RenameRename => "Upstream and the fork renamed a file to different names.",
            Self::RenameDelete => "Upstream renamed a file the fork deleted.",
            Self::ModifyDelete => "Upstream modified a file the fork deleted.",
        }
    }

    /// What recovery does for this kind when the commit carries `marker`
    /// (`None` for a commit without conflict markers).
    pub fn recovery_description(self, marker: Option<CommitMarker>) -> &'static str {
        use CommitMarker::{ConflictApply, ConflictSkip};
        match (self, marker) {
            (Self::Content, Some(ConflictApply)) => "keep the fork's version of the file",
            (Self::Content, Some(ConflictSkip)) => "keep upstream's version of the file",
            (Self::Content, _) => "unrecoverable, unless the resolution cache already solved it",
            (Self::DeleteModify, Some(ConflictApply)) => "keep the modified file",
            (Self::DeleteModify, _) => "delete the file",
            (Self::DeleteRename, Some(ConflictApply)) => "keep the renamed file",
            (Self::DeleteRename, _) => "delete both the old and the renamed file",
            (Self::RenameRename, Some(ConflictSkip)) => "keep upstream's name, drop the fork's",
            (Self::RenameRename, _) => "keep the fork's name",
            (Self::RenameDelete, Some(ConflictSkip)) => "keep the renamed file",
            (Self::RenameDelete, _) => "delete both the original and the renamed file",
            (Self::ModifyDelete, Some(ConflictSkip)) => "keep the modified file",
            (Self::ModifyDelete, _) => "delete the file",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// One conflict found in a report, with the paths recovery needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictItem {
    Content {
        path: String,
    },
    DeleteModify {
        upstream_deleted: String,
    },
    DeleteRename {
        upstream_deleted: String,
        fork_renamed: String,
    },
    RenameRename {
        original: String,
        upstream_renamed: String,
        fork_renamed: String,
    },
    RenameDelete {
        original: String,
        upstream_renamed: String,
    },
    ModifyDelete {
        upstream_modified: String,
    },
}

impl ConflictItem {
    pub fn kind(&self) -> ConflictKind {
        match self {
            Self::Content { .. } => ConflictKind::Content,
            Self::DeleteModify { .. } => ConflictKind::DeleteModify,
            Self::DeleteRename { .. } => ConflictKind::DeleteRename,
            Self::RenameRename { .. } => ConflictKind::RenameRename,
            Self::RenameDelete { .. } => ConflictKind::RenameDelete,
            Self::ModifyDelete { .. } => ConflictKind::ModifyDelete,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy & outcome
// ---------------------------------------------------------------------------

/// Which conflict markers the commit being replayed carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub apply: bool,
    pub skip: bool,
}

impl RecoveryPolicy {
    pub fn from_markers(markers: &MarkerSet) -> Self {
        Self {
            apply: markers.contains(&CommitMarker::ConflictApply),
            skip: markers.contains(&CommitMarker::ConflictSkip),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Resolved,
    Unrecoverable(Box<ConflictSuggestion>),
}
