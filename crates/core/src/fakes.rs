//! In-memory fakes for the collaborator traits (testing only).
//!
//! `FakeHost` serves canned GitHub data and paginates it like the real API;
//! `FakeVcs` records every `git` invocation and answers from a script,
//! keeping just enough state (branch, remotes, dirtiness) for the
//! orchestration code to observe its own effects.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::errors::{GitError, GitHubError};
use crate::git::{CodeHost, Vcs};
use crate::models::{
    CommitComment, HostedCommit, PullRequestRef, PullRequestState, Remote, RepoName,
};
use crate::sequence::Page;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn commit(sha: &str, message: &str) -> HostedCommit {
    HostedCommit {
        sha: sha.into(),
        message: message.into(),
        author: Some("dev".into()),
    }
}

pub fn pull_request(repo: &RepoName, number: u64, merged: bool, body: &str) -> PullRequestRef {
    PullRequestRef {
        repo: repo.clone(),
        number,
        state: if merged {
            PullRequestState::Closed
        } else {
            PullRequestState::Open
        },
        merged_at: merged.then(|| Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        body: body.into(),
        html_url: format!("https://github.com/{}/pull/{}", repo, number),
    }
}

fn paginate<T: Clone>(items: &[T], page: Page) -> Vec<T> {
    let start = (page.number as usize - 1) * page.per_page;
    items.iter().skip(start).take(page.per_page).cloned().collect()
}

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeHost {
    commits: HashMap<String, Vec<HostedCommit>>,
    commit_prs: HashMap<(String, String), Vec<PullRequestRef>>,
    commit_pr_failures: HashMap<(String, String), u16>,
    pulls: HashMap<(String, u64), PullRequestRef>,
    comments: HashMap<(String, String), Vec<CommitComment>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHost {
    /// Commits of `repo`, newest first.
    pub fn with_commits(&mut self, repo: &RepoName, commits: Vec<HostedCommit>) -> &mut Self {
        self.commits.insert(repo.to_string(), commits);
        self
    }

    /// Pull requests of `repo` containing `sha`.
    pub fn with_commit_prs(
        &mut self,
        repo: &RepoName,
        sha: &str,
        prs: Vec<PullRequestRef>,
    ) -> &mut Self {
        self.commit_prs.insert((repo.to_string(), sha.into()), prs);
        self
    }

    pub fn fail_commit_prs(&mut self, repo: &RepoName, sha: &str, status: u16) -> &mut Self {
        self.commit_pr_failures
            .insert((repo.to_string(), sha.into()), status);
        self
    }

    pub fn with_pull_request(&mut self, pr: PullRequestRef) -> &mut Self {
        self.pulls.insert((pr.repo.to_string(), pr.number), pr);
        self
    }

    pub fn with_comments(&mut self, repo: &RepoName, sha: &str, bodies: &[&str]) -> &mut Self {
        let comments = bodies
            .iter()
            .map(|b| CommitComment {
                body: b.to_string(),
            })
            .collect();
        self.comments.insert((repo.to_string(), sha.into()), comments);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CodeHost for FakeHost {
    async fn list_commits(
        &self,
        repo: &RepoName,
        head: &str,
        page: Page,
    ) -> Result<Vec<HostedCommit>, GitHubError> {
        self.record(format!("commits {} {} page={}", repo, head, page.number));
        let commits = self.commits.get(&repo.to_string()).cloned().unwrap_or_default();
        Ok(paginate(&commits, page))
    }

    async fn pull_requests_for_commit(
        &self,
        repo: &RepoName,
        sha: &str,
        page: Page,
    ) -> Result<Vec<PullRequestRef>, GitHubError> {
        self.record(format!("pulls {} {} page={}", repo, sha, page.number));
        let key = (repo.to_string(), sha.to_string());
        if let Some(status) = self.commit_pr_failures.get(&key) {
            return Err(GitHubError::ApiError {
                status: *status,
                body: format!("HTTP {}", status),
            });
        }
        let prs = self.commit_prs.get(&key).cloned().unwrap_or_default();
        Ok(paginate(&prs, page))
    }

    async fn pull_request(
        &self,
        repo: &RepoName,
        number: u64,
    ) -> Result<PullRequestRef, GitHubError> {
        self.record(format!("pull {} {}", repo, number));
        self.pulls
            .get(&(repo.to_string(), number))
            .cloned()
            .ok_or(GitHubError::ApiError {
                status: 404,
                body: "Not Found".into(),
            })
    }

    async fn commit_comments(
        &self,
        repo: &RepoName,
        sha: &str,
        page: Page,
    ) -> Result<Vec<CommitComment>, GitHubError> {
        self.record(format!("comments {} {} page={}", repo, sha, page.number));
        let comments = self
            .comments
            .get(&(repo.to_string(), sha.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(paginate(&comments, page))
    }
}

// ---------------------------------------------------------------------------
// FakeVcs
// ---------------------------------------------------------------------------

type Scripted = Result<String, (i32, String)>;

#[derive(Debug)]
pub struct FakeVcs {
    commands: Mutex<Vec<String>>,
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    dirty: Mutex<bool>,
    dirty_paths: Mutex<Vec<String>>,
    branch: Mutex<String>,
    default_branch: String,
    remote_branches: Vec<(String, String)>,
    unmerged: Mutex<Vec<String>>,
    remotes: Mutex<Vec<Remote>>,
    root: PathBuf,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            script: Mutex::new(HashMap::new()),
            dirty: Mutex::new(false),
            dirty_paths: Mutex::new(Vec::new()),
            branch: Mutex::new("main".into()),
            default_branch: "main".into(),
            remote_branches: Vec::new(),
            unmerged: Mutex::new(Vec::new()),
            remotes: Mutex::new(vec![Remote {
                name: "origin".into(),
                url: "https://github.com/acme/fork.git".into(),
            }]),
            root: PathBuf::from("/work/fork"),
        }
    }
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_branch(self, branch: &str) -> Self {
        *self.branch.lock().unwrap() = branch.into();
        self
    }

    pub fn with_remote_branch(mut self, remote: &str, branch: &str) -> Self {
        self.remote_branches.push((remote.into(), branch.into()));
        self
    }

    pub fn with_remote(self, name: &str, url: &str) -> Self {
        self.remotes.lock().unwrap().push(Remote {
            name: name.into(),
            url: url.into(),
        });
        self
    }

    pub fn set_dirty(&self, dirty: bool) {
        *self.dirty.lock().unwrap() = dirty;
    }

    /// Paths reported as changed when a filter is given.
    pub fn set_dirty_paths(&self, paths: &[&str]) {
        *self.dirty_paths.lock().unwrap() = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn set_unmerged(&self, paths: &[&str]) {
        *self.unmerged.lock().unwrap() = paths.iter().map(|p| p.to_string()).collect();
    }

    /// Queue a successful answer for the exact command line `cmd`.
    pub fn respond(&self, cmd: &str, output: &str) {
        self.push(cmd, Ok(output.into()));
    }

    /// Queue a failure for the exact command line `cmd`.
    pub fn fail(&self, cmd: &str, exit_code: i32, output: &str) {
        self.push(cmd, Err((exit_code, output.into())));
    }

    fn push(&self, cmd: &str, answer: Scripted) {
        self.script
            .lock()
            .unwrap()
            .entry(cmd.into())
            .or_default()
            .push_back(answer);
    }

    /// Every command run so far, joined with spaces.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn branch(&self) -> String {
        self.branch.lock().unwrap().clone()
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.remotes
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    /// Mirror the effect of commands the orchestration code observes later.
    fn apply_effects(&self, args: &[&str]) -> Result<(), GitError> {
        match args {
            ["checkout", "-b", name, ..] | ["checkout", "--orphan", name] => {
                *self.branch.lock().unwrap() = name.to_string();
            }
            ["checkout", name] if !name.starts_with('-') => {
                *self.branch.lock().unwrap() = name.to_string();
            }
            ["remote", "add", name, url] => {
                self.remotes.lock().unwrap().push(Remote {
                    name: name.to_string(),
                    url: url.to_string(),
                });
            }
            ["remote", "remove", name] => {
                let mut remotes = self.remotes.lock().unwrap();
                let before = remotes.len();
                remotes.retain(|r| r.name != *name);
                if remotes.len() == before {
                    return Err(GitError::CommandFailed {
                        command: "remote".into(),
                        exit_code: 2,
                        output: format!("error: No such remote: '{}'\n", name),
                    });
                }
            }
            ["reset", "--hard"] => {
                *self.dirty.lock().unwrap() = false;
                self.dirty_paths.lock().unwrap().clear();
                self.unmerged.lock().unwrap().clear();
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        if args.is_empty() {
            return Err(GitError::EmptyCommand);
        }
        let line = args.join(" ");
        self.commands.lock().unwrap().push(line.clone());

        let answer = self
            .script
            .lock()
            .unwrap()
            .get_mut(&line)
            .and_then(VecDeque::pop_front);
        match answer {
            Some(Err((exit_code, output))) => Err(GitError::CommandFailed {
                command: args[0].to_string(),
                exit_code,
                output,
            }),
            Some(Ok(output)) => {
                self.apply_effects(args)?;
                Ok(output)
            }
            None => {
                self.apply_effects(args)?;
                Ok(String::new())
            }
        }
    }

    async fn has_local_changes(&self, filter: Option<&str>) -> Result<bool, GitError> {
        let dirty = *self.dirty.lock().unwrap();
        Ok(match filter {
            None => dirty,
            Some(f) => {
                dirty
                    || self
                        .dirty_paths
                        .lock()
                        .unwrap()
                        .iter()
                        .any(|p| p.contains(f))
            }
        })
    }

    async fn current_branch(&self) -> Result<String, GitError> {
        Ok(self.branch())
    }

    async fn remote_default_branch(&self, _remote: &str) -> Result<String, GitError> {
        Ok(self.default_branch.clone())
    }

    async fn branch_exists_in_remote(&self, remote: &str, branch: &str) -> Result<bool, GitError> {
        Ok(self
            .remote_branches
            .iter()
            .any(|(r, b)| r == remote && b == branch))
    }

    async fn list_unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        Ok(self.unmerged.lock().unwrap().clone())
    }

    async fn remotes(&self) -> Result<Vec<Remote>, GitError> {
        Ok(self.remotes.lock().unwrap().clone())
    }

    async fn repo_root_dir(&self) -> Result<PathBuf, GitError> {
        Ok(self.root.clone())
    }
}
