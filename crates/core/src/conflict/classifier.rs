//! Turns the report of a failed cherry-pick into typed conflict items.

use regex_lite::Regex;
use tracing::debug;

use super::{ConflictItem, ConflictKind};
use crate::errors::ConflictError;

/// Characters `git` paths are matched with in conflict reports.
const PATH: &str = r"([-a-zA-Z0-9_./\\]+)";
const SHA: &str = r"[a-fA-F0-9]+";

/// Every conflict `git` reports starts with this tag.
pub const CONFLICT_PREFIX: &str = "CONFLICT (";

/// Result of classifying one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Non-content conflicts, to be resolved before content ones.
    pub items: Vec<ConflictItem>,
    /// Number of `CONFLICT (content)` entries.
    pub content: usize,
    /// Number of `CONFLICT (` entries of any kind.
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    matchers: Vec<(ConflictKind, Regex)>,
}

impl Classifier {
    /// Build matchers for the non-content kinds in `kinds`. Content conflicts
    /// are only counted here; their paths come from the working tree later.
    pub fn new(kinds: &[ConflictKind]) -> Result<Self, ConflictError> {
        let mut matchers = Vec::new();
        for kind in kinds {
            if let Some(pattern) = pattern_for(*kind) {
                let regex = Regex::new(&pattern).map_err(|e| ConflictError::InvalidPattern {
                    kind: kind.to_string(),
                    detail: e.to_string(),
                })?;
                matchers.push((*kind, regex));
            }
        }
        Ok(Self { matchers })
    }

    pub fn classify(&self, report: &str) -> Result<Classification, ConflictError> {
        let total = report.matches(CONFLICT_PREFIX).count();
        let content = report.matches("CONFLICT (content)").count();

        let mut items = Vec::new();
        for (kind, regex) in &self.matchers {
            for caps in regex.captures_iter(report) {
                let group = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
                let item = match kind {
                    ConflictKind::DeleteModify => group(1).map(|p| ConflictItem::DeleteModify {
                        upstream_deleted: p,
                    }),
                    ConflictKind::DeleteRename => {
                        group(1).zip(group(2)).map(|(old, new)| ConflictItem::DeleteRename {
                            upstream_deleted: old,
                            fork_renamed: new,
                        })
                    }
                    ConflictKind::RenameRename => match (group(1), group(2), group(3)) {
                        (Some(original), Some(upstream_renamed), Some(fork_renamed)) => {
                            Some(ConflictItem::RenameRename {
                                original,
                                upstream_renamed,
                                fork_renamed,
                            })
                        }
                        _ => None,
                    },
                    ConflictKind::RenameDelete => {
                        group(1).zip(group(2)).map(|(original, renamed)| {
                            ConflictItem::RenameDelete {
                                original,
                                upstream_renamed: renamed,
                            }
                        })
                    }
                    ConflictKind::ModifyDelete => group(1).map(|p| ConflictItem::ModifyDelete {
                        upstream_modified: p,
                    }),
                    ConflictKind::Content => None,
                };
                if let Some(item) = item {
                    debug!(kind = %kind, ?item, "classified conflict");
                    items.push(item);
                }
            }
        }

        let non_content = items.len();
        if non_content > total || total - non_content > content {
            return Err(ConflictError::UnknownConflicts {
                content,
                non_content,
                total,
                report: report.to_string(),
            });
        }

        Ok(Classification {
            items,
            content,
            total,
        })
    }
}

fn pattern_for(kind: ConflictKind) -> Option<String> {
    let pattern = match kind {
        ConflictKind::Content => return None,
        ConflictKind::DeleteModify => format!(
            r"CONFLICT \(modify/delete\): {PATH} deleted in HEAD and modified in {SHA} \(.*\)"
        ),
        ConflictKind::DeleteRename => format!(
            r"CONFLICT \(rename/delete\): {PATH} renamed to {PATH} in {SHA} \(.*\), but deleted in HEAD"
        ),
        ConflictKind::RenameRename => format!(
            r"CONFLICT \(rename/rename\): {PATH} renamed to {PATH} in HEAD and to {PATH} in {SHA} \(.*\)"
        ),
        ConflictKind::RenameDelete => format!(
            r"CONFLICT \(rename/delete\): {PATH} renamed to {PATH} in HEAD, but deleted in {SHA} \(.*\)"
        ),
        ConflictKind::ModifyDelete => format!(
            r"CONFLICT \(modify/delete\): {PATH} deleted in {SHA} \(.*\) and modified in HEAD"
        ),
    };
    Some(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(report: &str) -> Result<Classification, ConflictError> {
        Classifier::new(ConflictKind::ALL).unwrap().classify(report)
    }

    #[test]
    fn test_rename_rename() {
        let c = classify(
            "CONFLICT (rename/rename): a.txt renamed to a2.txt in HEAD and to a3.txt in 1a2b3c4 (fork rename).",
        )
        .unwrap();
        assert_eq!(
            c.items,
            vec![ConflictItem::RenameRename {
                original: "a.txt".into(),
                upstream_renamed: "a2.txt".into(),
                fork_renamed: "a3.txt".into(),
            }]
        );
        assert_eq!((c.content, c.total), (0, 1));
    }

    #[test]
    fn test_delete_and_modify_directions() {
        let report = "\
CONFLICT (modify/delete): src/gone.c deleted in HEAD and modified in abc123 (tweak gone). Version abc123 (tweak gone) of src/gone.c left in tree.
CONFLICT (modify/delete): docs/kept.md deleted in abc123 (drop docs) and modified in HEAD. Version HEAD of docs/kept.md left in tree.
";
        let c = classify(report).unwrap();
        assert_eq!(
            c.items,
            vec![
                ConflictItem::DeleteModify {
                    upstream_deleted: "src/gone.c".into()
                },
                ConflictItem::ModifyDelete {
                    upstream_modified: "docs/kept.md".into()
                },
            ]
        );
    }

    #[test]
    fn test_rename_delete_directions() {
        let report = "\
CONFLICT (rename/delete): old.txt renamed to new.txt in f00ba4 (move it), but deleted in HEAD.
CONFLICT (rename/delete): lib/a.rs renamed to lib/b.rs in HEAD, but deleted in f00ba4 (remove a).
";
        let c = classify(report).unwrap();
        assert_eq!(
            c.items,
            vec![
                ConflictItem::DeleteRename {
                    upstream_deleted: "old.txt".into(),
                    fork_renamed: "new.txt".into(),
                },
                ConflictItem::RenameDelete {
                    original: "lib/a.rs".into(),
                    upstream_renamed: "lib/b.rs".into(),
                },
            ]
        );
    }

    #[test]
    fn test_content_counted_not_itemised() {
        let report = "\
Auto-merging README.md
CONFLICT (content): Merge conflict in README.md
CONFLICT (modify/delete): x.txt deleted in HEAD and modified in 0ff1ce (edit x). Version 0ff1ce (edit x) of x.txt left in tree.
error: could not apply 0ff1ce... edit x
";
        let c = classify(report).unwrap();
        assert_eq!(c.items.len(), 1);
        assert_eq!((c.content, c.total), (1, 2));
    }

    #[test]
    fn test_unknown_conflict_is_an_error() {
        let report = "CONFLICT (add/add): Merge conflict in new.txt\nCONFLICT (content): Merge conflict in a.txt\n";
        let err = classify(report).unwrap_err();
        match err {
            ConflictError::UnknownConflicts {
                content,
                non_content,
                total,
                ..
            } => assert_eq!((content, non_content, total), (1, 0, 2)),
            other => panic!("expected unknown conflicts, got {:?}", other),
        }
    }

    #[test]
    fn test_restricted_catalog_leaves_kinds_unknown() {
        let classifier = Classifier::new(&[ConflictKind::Content]).unwrap();
        let report = "CONFLICT (rename/rename): a renamed to b in HEAD and to c in 123abc (x).";
        assert!(classifier.classify(report).is_err());
    }

    #[test]
    fn test_no_conflicts() {
        let c = classify("error: your local changes would be overwritten").unwrap();
        assert_eq!(c, Classification { items: vec![], content: 0, total: 0 });
    }
}
