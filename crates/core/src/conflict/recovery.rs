//! Resolves classified conflicts against the working tree.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::{
    Classification, Classifier, ConflictItem, ConflictKind, ConflictSuggestion, RecoveryOutcome,
    RecoveryPolicy, SuggestionContext,
};
use crate::errors::{ConflictError, GitError};
use crate::git::{Side, Vcs};

/// Drives recovery of one failed cherry-pick. Paths in conflict reports are
/// relative to the repository root, which is where `V` runs `git`.
pub struct Recovery<'v, V: Vcs + ?Sized> {
    vcs: &'v V,
    classifier: Classifier,
}

impl<'v, V: Vcs + ?Sized> Recovery<'v, V> {
    pub fn new(vcs: &'v V, classifier: Classifier) -> Self {
        Self { vcs, classifier }
    }

    /// Resolve every conflict listed in `report`, leaving all changes staged
    /// and the cherry-pick ready to be committed.
    pub async fn recover(
        &self,
        report: &str,
        policy: RecoveryPolicy,
        context: &SuggestionContext,
        sha: &str,
    ) -> Result<RecoveryOutcome, ConflictError> {
        let Classification {
            items,
            content,
            total,
        } = self.classifier.classify(report)?;
        info!(sha, total, content, non_content = items.len(), "recovering from conflicts");

        for item in &items {
            self.recover_item(item, policy).await?;
        }

        if content > 0 {
            let check = self.vcs.diff_check().await?;
            let marked = marked_paths(&check)?;
            if marked.is_empty() {
                warn!(sha, "content conflicts already resolved by the resolution cache");
            }
            for path in marked {
                let item = ConflictItem::Content { path };
                if !self.recover_item(&item, policy).await? {
                    warn!(sha, ?item, "no conflict marker applies to content conflict");
                    return Ok(RecoveryOutcome::Unrecoverable(Box::new(
                        ConflictSuggestion::new(context, sha),
                    )));
                }
            }
        }

        let unmerged = self.vcs.list_unmerged_paths().await?;
        if unmerged.len() != content {
            return Err(ConflictError::UnmergedMismatch {
                found: unmerged.len(),
                expected: content,
                paths: unmerged,
            });
        }
        self.vcs
            .stage_all()
            .await
            .map_err(|e| failed(ConflictKind::Content, e))?;

        Ok(RecoveryOutcome::Resolved)
    }

    /// Apply the policy table to one conflict. Returns `false` for a content
    /// conflict no marker covers; every other kind always has a default.
    pub async fn recover_item(
        &self,
        item: &ConflictItem,
        policy: RecoveryPolicy,
    ) -> Result<bool, ConflictError> {
        let kind = item.kind();
        debug!(%kind, ?item, ?policy, "recovering conflict");
        let step = match item {
            ConflictItem::Content { path } => {
                let side = if policy.skip {
                    Side::Ours
                } else if policy.apply {
                    Side::Theirs
                } else {
                    return Ok(false);
                };
                self.vcs.choose_side(side, path).await
            }
            ConflictItem::DeleteModify { upstream_deleted } => {
                if policy.apply {
                    self.vcs.stage(upstream_deleted).await
                } else {
                    self.remove_tolerant(upstream_deleted).await
                }
            }
            ConflictItem::DeleteRename {
                upstream_deleted,
                fork_renamed,
            } => {
                if policy.apply {
                    self.vcs.stage(fork_renamed).await
                } else {
                    self.remove_all(&[upstream_deleted, fork_renamed]).await
                }
            }
            // All three paths are unmerged: drop the original and the losing
            // rename, then stage the winner.
            ConflictItem::RenameRename {
                original,
                upstream_renamed,
                fork_renamed,
            } => {
                let (keep, discard) = if policy.skip {
                    (upstream_renamed, fork_renamed)
                } else {
                    (fork_renamed, upstream_renamed)
                };
                match self.remove_all(&[original, discard]).await {
                    Ok(()) => self.vcs.stage(keep).await,
                    Err(e) => Err(e),
                }
            }
            ConflictItem::RenameDelete {
                original,
                upstream_renamed,
            } => {
                if policy.skip {
                    self.vcs.stage(upstream_renamed).await
                } else {
                    self.remove_all(&[original, upstream_renamed]).await
                }
            }
            ConflictItem::ModifyDelete { upstream_modified } => {
                if policy.skip {
                    self.vcs.stage(upstream_modified).await
                } else {
                    self.remove_tolerant(upstream_modified).await
                }
            }
        };
        step.map_err(|e| failed(kind, e))?;
        Ok(true)
    }

    async fn remove_tolerant(&self, path: &str) -> Result<(), GitError> {
        match self.vcs.remove(path).await {
            Ok(()) => Ok(()),
            Err(GitError::CommandFailed { output, .. }) => {
                warn!(path, output = %output.trim(), "could not remove file, it may already be gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_all(&self, paths: &[&String]) -> Result<(), GitError> {
        for path in paths {
            self.remove_tolerant(path).await?;
        }
        Ok(())
    }
}

fn failed(kind: ConflictKind, source: GitError) -> ConflictError {
    ConflictError::RecoveryFailed {
        kind: kind.to_string(),
        source,
    }
}

/// Paths reported with leftover conflict markers by `git diff --check`, in
/// order of first appearance. Lines are `path:line: problem`, followed by
/// the offending diff line itself.
fn marked_paths(check: &str) -> Result<Vec<String>, ConflictError> {
    let mut seen = BTreeSet::new();
    let mut paths = Vec::new();
    for line in check.lines() {
        if line.is_empty() || line.starts_with(&['+', '-', ' '][..]) {
            continue;
        }
        let (path, rest) = line
            .split_once(':')
            .ok_or_else(|| ConflictError::MalformedCheckLine(line.to_string()))?;
        let (number, problem) = rest
            .split_once(": ")
            .ok_or_else(|| ConflictError::MalformedCheckLine(line.to_string()))?;
        if path.is_empty() || number.parse::<u64>().is_err() {
            return Err(ConflictError::MalformedCheckLine(line.to_string()));
        }
        if problem.contains("conflict marker") && seen.insert(path.to_string()) {
            paths.push(path.to_string());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeVcs;

    const RENAME_RENAME: &str =
        "CONFLICT (rename/rename): a.txt renamed to a2.txt in HEAD and to a3.txt in 1a2b3c4 (fork rename).";

    fn context() -> SuggestionContext {
        SuggestionContext {
            upstream: "up/libs".parse().unwrap(),
            upstream_ref: "v1".into(),
            fork: "acme/libs".parse().unwrap(),
            branch: "sync".into(),
            web_url: "https://github.com".into(),
        }
    }

    fn recovery(vcs: &FakeVcs) -> Recovery<'_, FakeVcs> {
        Recovery::new(vcs, Classifier::new(ConflictKind::ALL).unwrap())
    }

    fn apply() -> RecoveryPolicy {
        RecoveryPolicy {
            apply: true,
            skip: false,
        }
    }

    fn skip() -> RecoveryPolicy {
        RecoveryPolicy {
            apply: false,
            skip: true,
        }
    }

    #[tokio::test]
    async fn test_rename_rename_default_keeps_fork_name() {
        let vcs = FakeVcs::new();
        let outcome = recovery(&vcs)
            .recover(RENAME_RENAME, RecoveryPolicy::default(), &context(), "1a2b3c4")
            .await
            .unwrap();
        assert_eq!(outcome, RecoveryOutcome::Resolved);
        assert_eq!(
            vcs.commands(),
            vec!["rm -f a.txt", "rm -f a2.txt", "add a3.txt", "add -A"]
        );
    }

    #[tokio::test]
    async fn test_rename_rename_skip_keeps_upstream_name() {
        let vcs = FakeVcs::new();
        recovery(&vcs)
            .recover(RENAME_RENAME, skip(), &context(), "1a2b3c4")
            .await
            .unwrap();
        assert_eq!(
            vcs.commands(),
            vec!["rm -f a.txt", "rm -f a3.txt", "add a2.txt", "add -A"]
        );
    }

    #[tokio::test]
    async fn test_policy_table() {
        let cases: Vec<(ConflictItem, RecoveryPolicy, Vec<&str>)> = vec![
            (
                ConflictItem::DeleteModify { upstream_deleted: "f".into() },
                apply(),
                vec!["add f"],
            ),
            (
                ConflictItem::DeleteModify { upstream_deleted: "f".into() },
                skip(),
                vec!["rm -f f"],
            ),
            (
                ConflictItem::DeleteRename {
                    upstream_deleted: "old".into(),
                    fork_renamed: "new".into(),
                },
                apply(),
                vec!["add new"],
            ),
            (
                ConflictItem::DeleteRename {
                    upstream_deleted: "old".into(),
                    fork_renamed: "new".into(),
                },
                RecoveryPolicy::default(),
                vec!["rm -f old", "rm -f new"],
            ),
            (
                ConflictItem::RenameDelete {
                    original: "a".into(),
                    upstream_renamed: "b".into(),
                },
                skip(),
                vec!["add b"],
            ),
            (
                ConflictItem::RenameDelete {
                    original: "a".into(),
                    upstream_renamed: "b".into(),
                },
                apply(),
                vec!["rm -f a", "rm -f b"],
            ),
            (
                ConflictItem::ModifyDelete { upstream_modified: "m".into() },
                skip(),
                vec!["add m"],
            ),
            (
                ConflictItem::ModifyDelete { upstream_modified: "m".into() },
                apply(),
                vec!["rm -f m"],
            ),
        ];

        for (item, policy, expected) in cases {
            let vcs = FakeVcs::new();
            assert!(recovery(&vcs).recover_item(&item, policy).await.unwrap());
            assert_eq!(vcs.commands(), expected, "{:?} with {:?}", item, policy);
        }
    }

    #[tokio::test]
    async fn test_missing_file_removal_is_tolerated() {
        let vcs = FakeVcs::new();
        vcs.fail("rm -f f", 128, "fatal: pathspec 'f' did not match any files");
        recovery(&vcs)
            .recover_item(
                &ConflictItem::DeleteModify { upstream_deleted: "f".into() },
                RecoveryPolicy::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_stage_wraps_kind() {
        let vcs = FakeVcs::new();
        vcs.fail("add f", 128, "fatal: boom");
        let err = recovery(&vcs)
            .recover_item(&ConflictItem::DeleteModify { upstream_deleted: "f".into() }, apply())
            .await
            .unwrap_err();
        match err {
            ConflictError::RecoveryFailed { kind, .. } => assert_eq!(kind, "delete/modify"),
            other => panic!("expected recovery failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_content_apply_takes_fork_side() {
        let vcs = FakeVcs::new();
        vcs.fail(
            "diff --check",
            2,
            "src/lib.c:10: leftover conflict marker\n+<<<<<<< HEAD\nsrc/lib.c:12: leftover conflict marker\n+=======\n",
        );
        vcs.set_unmerged(&["src/lib.c"]);
        let outcome = recovery(&vcs)
            .recover(
                "CONFLICT (content): Merge conflict in src/lib.c",
                apply(),
                &context(),
                "abc",
            )
            .await
            .unwrap();
        assert_eq!(outcome, RecoveryOutcome::Resolved);
        assert_eq!(
            vcs.commands(),
            vec!["diff --check", "checkout --theirs src/lib.c", "add -A"]
        );
    }

    #[tokio::test]
    async fn test_content_skip_takes_upstream_side() {
        let vcs = FakeVcs::new();
        vcs.fail("diff --check", 2, "README.md:3: leftover conflict marker\n");
        vcs.set_unmerged(&["README.md"]);
        recovery(&vcs)
            .recover("CONFLICT (content): Merge conflict in README.md", skip(), &context(), "abc")
            .await
            .unwrap();
        assert!(vcs.commands().contains(&"checkout --ours README.md".to_string()));
    }

    #[tokio::test]
    async fn test_content_without_marker_is_unrecoverable() {
        let vcs = FakeVcs::new();
        vcs.fail("diff --check", 2, "README.md:3: leftover conflict marker\n");
        let outcome = recovery(&vcs)
            .recover(
                "CONFLICT (content): Merge conflict in README.md",
                RecoveryPolicy::default(),
                &context(),
                "abc",
            )
            .await
            .unwrap();
        match outcome {
            RecoveryOutcome::Unrecoverable(suggestion) => {
                assert_eq!(suggestion.sha, "abc");
                assert_eq!(suggestion.context.branch, "sync");
            }
            other => panic!("expected unrecoverable, got {:?}", other),
        }
        assert!(!vcs.commands().contains(&"add -A".to_string()));
    }

    #[tokio::test]
    async fn test_content_already_resolved_by_cache() {
        let vcs = FakeVcs::new();
        vcs.set_unmerged(&["README.md"]);
        let outcome = recovery(&vcs)
            .recover(
                "CONFLICT (content): Merge conflict in README.md",
                RecoveryPolicy::default(),
                &context(),
                "abc",
            )
            .await
            .unwrap();
        assert_eq!(outcome, RecoveryOutcome::Resolved);
        assert_eq!(vcs.commands(), vec!["diff --check", "add -A"]);
    }

    #[tokio::test]
    async fn test_mixed_conflicts_require_one_unmerged_path() {
        let report = "\
CONFLICT (content): Merge conflict in README.md
CONFLICT (modify/delete): x.txt deleted in HEAD and modified in 0ff1ce (edit x). Version 0ff1ce (edit x) of x.txt left in tree.
";
        let vcs = FakeVcs::new();
        vcs.set_unmerged(&["README.md"]);
        let outcome = recovery(&vcs)
            .recover(report, RecoveryPolicy::default(), &context(), "0ff1ce")
            .await
            .unwrap();
        assert_eq!(outcome, RecoveryOutcome::Resolved);
        assert_eq!(vcs.commands()[0], "rm -f x.txt");

        let vcs = FakeVcs::new();
        vcs.set_unmerged(&["README.md", "x.txt"]);
        let err = recovery(&vcs)
            .recover(report, RecoveryPolicy::default(), &context(), "0ff1ce")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "found 2 unmerged files but expected 1: README.md,x.txt"
        );
    }

    #[test]
    fn test_marked_paths() {
        let check = "\
a.c:1: leftover conflict marker
+<<<<<<< HEAD
a.c:5: leftover conflict marker
b.c:7: trailing whitespace.
+int x;
c.c:2: leftover conflict marker
";
        assert_eq!(marked_paths(check).unwrap(), vec!["a.c", "c.c"]);
        assert!(marked_paths("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_check_line() {
        assert!(matches!(
            marked_paths("what is this"),
            Err(ConflictError::MalformedCheckLine(_))
        ));
        assert!(matches!(
            marked_paths("a.c:x: leftover conflict marker"),
            Err(ConflictError::MalformedCheckLine(_))
        ));
    }
}
