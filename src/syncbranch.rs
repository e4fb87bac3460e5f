//! Sync-branch transport: a dedicated git branch, synced through a private
//! worktree, as an alternative to pushing `.beads/issues.jsonl` on whatever
//! branch happens to be checked out.
//!
//! This lives outside `src/sync/` on purpose — see
//! [`crate::validation::SyncSafetyValidator::assert_no_git_in_sync`]. Sync
//! code never shells out to git; this module is the one place that does,
//! and it only ever touches the worktree under `.git/beads-worktrees/`, not
//! the main working tree's `.git/`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{BeadsError, Result};

/// State of a sync-branch worktree, per the component's state machine:
/// `absent -> created -> healthy <-> unhealthy(pointer missing) -> repaired(==created)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeState {
    /// The worktree directory does not exist.
    Absent,
    /// The worktree directory exists and its `.git` pointer file resolves.
    Healthy,
    /// The worktree directory exists but its `.git` pointer file is
    /// missing or broken (someone deleted `.git/worktrees/<name>`).
    Unhealthy,
}

/// Manages the dedicated worktree for one sync branch.
pub struct SyncBranchTransport {
    repo_root: PathBuf,
    branch: String,
    worktree_path: PathBuf,
}

impl SyncBranchTransport {
    /// Create a transport for `branch` in the repository rooted at
    /// `repo_root`. Does not touch the filesystem.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        let repo_root = repo_root.into();
        let branch = branch.into();
        let worktree_path = repo_root
            .join(".git")
            .join("beads-worktrees")
            .join(sanitize_branch_for_path(&branch));
        Self {
            repo_root,
            branch,
            worktree_path,
        }
    }

    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    #[must_use]
    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    /// Inspect the worktree's current state without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot be invoked.
    pub fn state(&self) -> Result<WorktreeState> {
        if !self.worktree_path.is_dir() {
            return Ok(WorktreeState::Absent);
        }

        // `git rev-parse --git-dir` inside the worktree fails if its
        // pointer file (`<worktree>/.git`) was removed out from under it.
        let output = run_git(&self.worktree_path, &["rev-parse", "--git-dir"])?;
        if output.status.success() {
            Ok(WorktreeState::Healthy)
        } else {
            Ok(WorktreeState::Unhealthy)
        }
    }

    /// Ensure the worktree exists and is healthy, creating or repairing it
    /// as needed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BeadsError::Transport`] if git operations fail.
    pub fn ensure_healthy(&self) -> Result<()> {
        match self.state()? {
            WorktreeState::Healthy => Ok(()),
            WorktreeState::Absent => self.create_worktree(),
            WorktreeState::Unhealthy => self.repair_worktree(),
        }
    }

    fn create_worktree(&self) -> Result<()> {
        if let Some(parent) = self.worktree_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let branch_exists =
            run_git(&self.repo_root, &["rev-parse", "--verify", &self.branch])?.status.success();
        let path_str = self.worktree_path.to_string_lossy().into_owned();

        let args: Vec<&str> = if branch_exists {
            vec!["worktree", "add", &path_str, &self.branch]
        } else {
            vec!["worktree", "add", "-b", &self.branch, &path_str]
        };

        let output = run_git(&self.repo_root, &args)?;
        require_success(&output, "git worktree add")
    }

    fn repair_worktree(&self) -> Result<()> {
        let path_str = self.worktree_path.to_string_lossy().into_owned();
        let output = run_git(&self.repo_root, &["worktree", "repair", &path_str])?;
        require_success(&output, "git worktree repair")?;

        if self.state()? != WorktreeState::Healthy {
            // Repair didn't stick (pointer target itself is gone); recreate
            // from scratch.
            std::fs::remove_dir_all(&self.worktree_path).ok();
            self.create_worktree()?;
        }
        Ok(())
    }

    /// Copy `jsonl_path` into the worktree, commit, and optionally push.
    ///
    /// On a non-fast-forward push rejection, fetches the remote ref,
    /// rebases the worktree branch onto it, and retries once. The local
    /// commit is never discarded: if the retry also fails, the error
    /// surfaces and the commit remains in the worktree.
    ///
    /// # Errors
    ///
    /// Returns [`BeadsError::Transport`] if any git step fails, or if the
    /// push is rejected twice in a row.
    pub fn commit(&self, jsonl_path: &Path, push: bool) -> Result<()> {
        self.ensure_healthy()?;

        let dest = self.worktree_path.join(".beads").join("issues.jsonl");
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(jsonl_path, &dest)?;

        require_success(
            &run_git(&self.worktree_path, &["add", "-A"])?,
            "git add",
        )?;

        let commit_output = run_git(
            &self.worktree_path,
            &["commit", "--no-verify", "-m", "bd daemon sync"],
        )?;
        if !commit_output.status.success() {
            let stderr = String::from_utf8_lossy(&commit_output.stderr);
            if !stderr.contains("nothing to commit") {
                return Err(BeadsError::Transport {
                    reason: format!("git commit failed: {stderr}"),
                });
            }
        }

        if push {
            self.push_with_retry()?;
        }

        Ok(())
    }

    fn push_with_retry(&self) -> Result<()> {
        let first = run_git(&self.worktree_path, &["push", "origin", &self.branch])?;
        if first.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&first.stderr);
        if !stderr.contains("non-fast-forward") && !stderr.contains("fetch first") {
            return Err(BeadsError::Transport {
                reason: format!("git push failed: {stderr}"),
            });
        }

        require_success(
            &run_git(&self.worktree_path, &["fetch", "origin", &self.branch])?,
            "git fetch",
        )?;
        require_success(
            &run_git(
                &self.worktree_path,
                &["rebase", &format!("origin/{}", self.branch)],
            )?,
            "git rebase",
        )?;

        let retry = run_git(&self.worktree_path, &["push", "origin", &self.branch])?;
        require_success(&retry, "git push (retry after rebase)")
    }

    /// Fetch and fast-forward-merge the sync branch, then copy the
    /// worktree's JSONL back over the main working JSONL. A no-op
    /// returning `Ok(false)` if the branch has nothing new.
    ///
    /// # Errors
    ///
    /// Returns [`BeadsError::Transport`] if any git step fails, or if the
    /// worktree is left dirty after the merge (a fatal state — it means a
    /// local change in the worktree conflicts with the pull).
    pub fn pull(&self, jsonl_path: &Path) -> Result<bool> {
        self.ensure_healthy()?;

        require_success(
            &run_git(&self.worktree_path, &["fetch", "origin", &self.branch])?,
            "git fetch",
        )?;

        let before = std::fs::read(jsonl_path.with_extension("jsonl")).unwrap_or_default();

        let merge = run_git(
            &self.worktree_path,
            &["merge", "--ff-only", &format!("origin/{}", self.branch)],
        )?;
        if !merge.status.success() {
            let stderr = String::from_utf8_lossy(&merge.stderr);
            if stderr.contains("Already up to date") {
                return Ok(false);
            }
            return Err(BeadsError::Transport {
                reason: format!("git merge --ff-only failed: {stderr}"),
            });
        }

        let status = run_git(&self.worktree_path, &["status", "--porcelain"])?;
        let dirty = !String::from_utf8_lossy(&status.stdout).trim().is_empty();
        if dirty {
            return Err(BeadsError::Transport {
                reason: "sync worktree is dirty after pull".to_string(),
            });
        }

        let worktree_jsonl = self.worktree_path.join(".beads").join("issues.jsonl");
        if !worktree_jsonl.exists() {
            return Ok(false);
        }

        let after = std::fs::read(&worktree_jsonl)?;
        if after == before {
            return Ok(false);
        }

        if let Some(parent) = jsonl_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&worktree_jsonl, jsonl_path)?;
        Ok(true)
    }
}

fn require_success(output: &std::process::Output, what: &str) -> Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        Err(BeadsError::Transport {
            reason: format!("{what} failed: {}", String::from_utf8_lossy(&output.stderr)),
        })
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| BeadsError::Transport {
            reason: format!("failed to run git {args:?}: {e}"),
        })
}

/// Worktree directory names can't contain `/`; nested branch names like
/// `beads/sync` are flattened.
fn sanitize_branch_for_path(branch: &str) -> String {
    branch.replace('/', "-")
}
