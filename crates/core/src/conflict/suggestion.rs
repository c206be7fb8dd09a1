//! The hand-off text shown when a conflict cannot be resolved automatically.

use std::fmt;

use crate::git::remote_url::repo_web_url;
use crate::models::RepoName;

/// Where a replay was running when it hit the conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionContext {
    pub upstream: RepoName,
    pub upstream_ref: String,
    pub fork: RepoName,
    /// The in-progress output branch.
    pub branch: String,
    /// Web base URL, e.g. `https://github.com`.
    pub web_url: String,
}

/// Step-by-step instructions for resolving one conflicting commit by hand
/// and recording the resolution so later runs reuse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSuggestion {
    pub context: SuggestionContext,
    pub sha: String,
}

impl ConflictSuggestion {
    pub fn new(context: &SuggestionContext, sha: &str) -> Self {
        Self {
            context: context.clone(),
            sha: sha.to_string(),
        }
    }

    pub fn upstream_ref_url(&self) -> String {
        format!(
            "{}/tree/{}",
            repo_web_url(&self.context.web_url, &self.context.upstream),
            self.context.upstream_ref
        )
    }

    pub fn commit_url(&self) -> String {
        format!(
            "{}/commit/{}",
            repo_web_url(&self.context.web_url, &self.context.fork),
            self.sha
        )
    }

    pub fn branch_url(&self) -> String {
        format!(
            "{}/tree/{}",
            repo_web_url(&self.context.web_url, &self.context.fork),
            self.context.branch
        )
    }
}

impl fmt::Display for ConflictSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fork = &self.context.fork;
        let branch = &self.context.branch;
        writeln!(f, "Context:")?;
        writeln!(f)?;
        writeln!(f, "* A merge conflict occurred and can't be resolved automatically")?;
        writeln!(f, "* Upstream base ref: {}", self.upstream_ref_url())?;
        writeln!(f, "* Conflicting commit: {}", self.commit_url())?;
        writeln!(f, "* In-progress sync branch: {}", self.branch_url())?;
        writeln!(f)?;
        writeln!(f, "Action items:")?;
        writeln!(f)?;
        writeln!(
            f,
            "Consider using a commit marker (see `forksync explain markers`), or solve the conflict manually by:"
        )?;
        writeln!(f)?;
        writeln!(f, "1. Make sure to have installed both `git` and `forksync` (`cargo install forksync-cli`).")?;
        writeln!(f, "2. Checkout fork repo and cd into it:")?;
        writeln!(
            f,
            "   `cd /tmp && git clone {}.git && cd {}`",
            repo_web_url(&self.context.web_url, fork),
            fork.repo
        )?;
        writeln!(f, "3. Make sure `git rerere` is enabled in the repo and pull latest cached resolutions:")?;
        writeln!(f, "   `git config rerere.enabled true`")?;
        writeln!(f, "   `forksync conflict pull`")?;
        writeln!(f, "4. Checkout unfinished sync branch:")?;
        writeln!(f, "   `git fetch origin`")?;
        writeln!(f, "   `git checkout {}`", branch)?;
        writeln!(f, "5. Apply the conflicting commit, solve the conflict manually, and commit it:")?;
        writeln!(f, "   `git cherry-pick {}`", self.sha)?;
        writeln!(f, "   ... solve conflicts manually and stage all changes...")?;
        writeln!(f, "   `git cherry-pick --continue`")?;
        writeln!(f, "6. Update fork's conflict resolution cache so that this won't be asked again:")?;
        write!(f, "   `forksync conflict push`")
    }
}
