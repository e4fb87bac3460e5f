//! Snapshot manager: `base`/`left` side-files used by the three-way merger.
//!
//! Two files live next to the working JSONL:
//! - `<jsonl>.base` — content as of the last successful import (common ancestor).
//! - `<jsonl>.left` — content just before the most recent pull ("ours").
//!
//! The working JSONL itself plays "right" (theirs) once a pull has landed.
//! Side-files are never tracked by git.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BeadsError, Result};
use crate::model::Issue;

use super::read_issues_from_jsonl;

/// How much clock skew between `left` and `base` mtimes is tolerated before
/// [`SnapshotManager::validate`] considers the pair stale. Generous because
/// snapshots are meant to be captured in the same process run, seconds apart.
const STALE_HORIZON: Duration = Duration::from_secs(3600);

/// Manages the `base` and `left` snapshot side-files for one working JSONL.
pub struct SnapshotManager {
    jsonl_path: PathBuf,
    base_path: PathBuf,
    left_path: PathBuf,
}

impl SnapshotManager {
    /// Create a manager for the given working JSONL path.
    #[must_use]
    pub fn new(jsonl_path: impl Into<PathBuf>) -> Self {
        let jsonl_path = jsonl_path.into();
        let base_path = side_file_path(&jsonl_path, "base");
        let left_path = side_file_path(&jsonl_path, "left");
        Self {
            jsonl_path,
            base_path,
            left_path,
        }
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    #[must_use]
    pub fn left_path(&self) -> &Path {
        &self.left_path
    }

    /// If `base` is missing, seed it from the current working JSONL.
    ///
    /// Idempotent: a pre-existing base is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the working JSONL exists but cannot be read, or
    /// the base file cannot be written.
    pub fn initialize(&self) -> Result<()> {
        if self.base_path.exists() {
            return Ok(());
        }
        copy_or_create_empty(&self.jsonl_path, &self.base_path)
    }

    /// Copy the current working JSONL into `left`. Call this immediately
    /// before any operation that will overwrite the working JSONL with
    /// remote content (a pull or a merge apply).
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    pub fn capture_left(&self) -> Result<()> {
        copy_or_create_empty(&self.jsonl_path, &self.left_path)
    }

    /// Copy the current working JSONL into `base`. Call this after a
    /// successful import.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails.
    pub fn update_base(&self) -> Result<()> {
        copy_or_create_empty(&self.jsonl_path, &self.base_path)
    }

    /// Reject snapshot pairs where `left` is implausibly newer than `base`,
    /// which would indicate a half-finished prior merge. Callers treat a
    /// `Stale` error as "skip merge, re-initialize".
    ///
    /// # Errors
    ///
    /// Returns [`BeadsError::Stale`] if the pair fails the freshness check.
    pub fn validate(&self) -> Result<()> {
        let Ok(base_meta) = fs::metadata(&self.base_path) else {
            return Ok(());
        };
        let Ok(left_meta) = fs::metadata(&self.left_path) else {
            return Ok(());
        };

        let base_mtime = base_meta.modified().map_err(BeadsError::Io)?;
        let left_mtime = left_meta.modified().map_err(BeadsError::Io)?;

        if let Ok(drift) = left_mtime.duration_since(base_mtime) {
            if drift > STALE_HORIZON {
                return Err(BeadsError::Stale {
                    reason: format!(
                        "left snapshot is {}s newer than base, exceeding the {}s safety horizon",
                        drift.as_secs(),
                        STALE_HORIZON.as_secs()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Read `base` as an `id -> Issue` map. Empty map if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_base(&self) -> Result<HashMap<String, Issue>> {
        load_issue_map(&self.base_path)
    }

    /// Read `left` as an `id -> Issue` map. Empty map if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_left(&self) -> Result<HashMap<String, Issue>> {
        load_issue_map(&self.left_path)
    }

    /// Read the working JSONL ("right") as an `id -> Issue` map.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_right(&self) -> Result<HashMap<String, Issue>> {
        load_issue_map(&self.jsonl_path)
    }

    /// IDs present in `base` but absent from `merged` — the set of deletions
    /// a merge accepted. Deletion wins over local modification: an id that
    /// was edited in `left` but dropped in `merged` still counts as accepted.
    #[must_use]
    pub fn compute_accepted_deletions(
        base: &HashMap<String, Issue>,
        merged: &HashMap<String, Issue>,
    ) -> Vec<String> {
        let mut deletions: Vec<String> = base
            .keys()
            .filter(|id| !merged.contains_key(*id))
            .cloned()
            .collect();
        deletions.sort();
        deletions
    }
}

fn side_file_path(jsonl_path: &Path, suffix: &str) -> PathBuf {
    let mut name = jsonl_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "issues.jsonl".to_string());
    name.push('.');
    name.push_str(suffix);
    jsonl_path
        .parent()
        .map(|p| p.join(&name))
        .unwrap_or_else(|| PathBuf::from(&name))
}

fn load_issue_map(path: &Path) -> Result<HashMap<String, Issue>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let issues = read_issues_from_jsonl(path)?;
    Ok(issues.into_iter().map(|i| (i.id.clone(), i)).collect())
}

/// Copy `src` to `dst` via a temp file and atomic rename. If `src` does not
/// exist yet, create an empty `dst` instead (a workspace's first snapshot).
fn copy_or_create_empty(src: &Path, dst: &Path) -> Result<()> {
    let tmp = dst.with_extension("tmp");

    if src.exists() {
        fs::copy(src, &tmp)?;
    } else {
        File::create(&tmp)?;
    }

    fs::rename(&tmp, dst)?;
    Ok(())
}
