//! Pluggable snapshot backend.
//!
//! `WorkspaceState` is the capability set `{snapshot, list, restore, ensureBranch, describeHead}`.
//! [`NullState`] is used when the host provides no content-addressed storage; [`GitState`] is
//! the reference content-versioned backend. Both are synchronous — tool execution already runs
//! on a worker thread per, so there is no need for these calls to be async.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::WorkspaceError;

/// One reported snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotInfo {
    pub id: String,
    pub label: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of `describe_head`.
#[derive(Clone, Debug)]
pub struct HeadDescription {
    pub commit: Option<String>,
    pub branch: Option<String>,
    pub is_dirty: bool,
}

/// Capability set satisfied by any snapshot backend for a workspace's `internal_root`.
pub trait WorkspaceState: Send + Sync {
    /// Stages every change under the workspace root and commits it (empty commits allowed).
    /// Returns `None` for backends with no content-addressed storage.
    fn snapshot(&self, label: Option<&str>) -> Result<Option<String>, WorkspaceError>;

    /// Newest-first, capped at `limit`.
    fn list_snapshots(&self, limit: usize) -> Result<Vec<SnapshotInfo>, WorkspaceError>;

    /// Hard-resets the working tree to `commit_id` (or the tip of `branch` if `commit_id` is
    /// `None`). Fails with [`WorkspaceError::UnknownSnapshot`]/[`WorkspaceError::UnknownBranch`]
    /// if the target does not exist.
    fn restore(
        &self,
        commit_id: Option<&str>,
        branch: Option<&str>,
        checkout: bool,
    ) -> Result<bool, WorkspaceError>;

    /// Creates or moves the named branch to `commit_id` (or the current head if `None`).
    fn ensure_branch(
        &self,
        name: &str,
        commit_id: Option<&str>,
        checkout: bool,
    ) -> Result<(), WorkspaceError>;

    fn describe_head(&self) -> Result<HeadDescription, WorkspaceError>;
}

/// No content-addressed storage. Every operation is a documented no-op.
pub struct NullState;

impl WorkspaceState for NullState {
    fn snapshot(&self, _label: Option<&str>) -> Result<Option<String>, WorkspaceError> {
        Ok(None)
    }

    fn list_snapshots(&self, _limit: usize) -> Result<Vec<SnapshotInfo>, WorkspaceError> {
        Ok(Vec::new())
    }

    fn restore(
        &self,
        _commit_id: Option<&str>,
        _branch: Option<&str>,
        _checkout: bool,
    ) -> Result<bool, WorkspaceError> {
        Ok(false)
    }

    fn ensure_branch(
        &self,
        _name: &str,
        _commit_id: Option<&str>,
        _checkout: bool,
    ) -> Result<(), WorkspaceError> {
        Ok(())
    }

    fn describe_head(&self) -> Result<HeadDescription, WorkspaceError> {
        Ok(HeadDescription {
            commit: None,
            branch: None,
            is_dirty: false,
        })
    }
}

const COMMIT_AUTHOR_NAME: &str = "okcvm";
const COMMIT_AUTHOR_EMAIL: &str = "okcvm@localhost";

/// Git-backed content-versioned snapshot store, isolated to the workspace's own `.git`: no
/// user-level or system git config is read (`git2::Repository::open` + per-repo config only),
/// and every commit uses a fixed author identity.
pub struct GitState {
    root: PathBuf,
}

impl GitState {
    /// Opens the repository at `root`, initializing one if it doesn't exist yet.
    pub fn open_or_init(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        if !root.join(".git").exists() {
            git2::Repository::init(&root).map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        }
        Ok(Self { root })
    }

    fn repo(&self) -> Result<git2::Repository, WorkspaceError> {
        git2::Repository::open(&self.root).map_err(|e| WorkspaceError::Backend(e.to_string()))
    }

    fn signature(&self) -> Result<git2::Signature<'static>, WorkspaceError> {
        git2::Signature::now(COMMIT_AUTHOR_NAME, COMMIT_AUTHOR_EMAIL)
            .map_err(|e| WorkspaceError::Backend(e.to_string()))
    }

    fn resolve_commit<'repo>(
        &self,
        repo: &'repo git2::Repository,
        commit_id: Option<&str>,
        branch: Option<&str>,
    ) -> Result<git2::Commit<'repo>, WorkspaceError> {
        if let Some(id) = commit_id {
            let oid = git2::Oid::from_str(id)
                .map_err(|_| WorkspaceError::UnknownSnapshot(id.to_string()))?;
            return repo
                .find_commit(oid)
                .map_err(|_| WorkspaceError::UnknownSnapshot(id.to_string()));
        }
        if let Some(name) = branch {
            let ref_name = format!("refs/heads/{name}");
            let reference = repo
                .find_reference(&ref_name)
                .map_err(|_| WorkspaceError::UnknownBranch(name.to_string()))?;
            return reference
                .peel_to_commit()
                .map_err(|e| WorkspaceError::Backend(e.to_string()));
        }
        repo.head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| WorkspaceError::Backend(e.to_string()))
    }
}

/// Collapses internal whitespace runs to single spaces and trims; keeps a commit label on one
/// line.
fn collapse_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl WorkspaceState for GitState {
    fn snapshot(&self, label: Option<&str>) -> Result<Option<String>, WorkspaceError> {
        let repo = self.repo()?;
        let mut index = repo.index().map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        index.write().map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        let tree_id = index.write_tree().map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        let tree = repo.find_tree(tree_id).map_err(|e| WorkspaceError::Backend(e.to_string()))?;

        let sig = self.signature()?;
        let message = label
            .map(collapse_label)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "snapshot".to_string());

        let parents: Vec<git2::Commit> = match repo.head().and_then(|h| h.peel_to_commit()) {
            Ok(commit) => vec![commit],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        let commit_id = repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parent_refs)
            .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        Ok(Some(commit_id.to_string()))
    }

    fn list_snapshots(&self, limit: usize) -> Result<Vec<SnapshotInfo>, WorkspaceError> {
        let repo = self.repo()?;
        let head = match repo.head().and_then(|h| h.peel_to_commit()) {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };
        let mut walk = repo.revwalk().map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        walk.push(head.id()).map_err(|e| WorkspaceError::Backend(e.to_string()))?;

        let mut out = Vec::new();
        for oid in walk.take(limit) {
            let oid = oid.map_err(|e| WorkspaceError::Backend(e.to_string()))?;
            let commit = repo.find_commit(oid).map_err(|e| WorkspaceError::Backend(e.to_string()))?;
            let timestamp = DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_else(Utc::now);
            out.push(SnapshotInfo {
                id: oid.to_string(),
                label: commit.message().map(|s| s.to_string()),
                timestamp,
            });
        }
        Ok(out)
    }

    fn restore(
        &self,
        commit_id: Option<&str>,
        branch: Option<&str>,
        checkout: bool,
    ) -> Result<bool, WorkspaceError> {
        let repo = self.repo()?;
        let commit = self.resolve_commit(&repo, commit_id, branch)?;

        if checkout {
            let object = commit.as_object();
            repo.reset(object, git2::ResetType::Hard, None)
                .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        } else {
            repo.set_head_detached(commit.id())
                .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        }
        Ok(true)
    }

    fn ensure_branch(
        &self,
        name: &str,
        commit_id: Option<&str>,
        checkout: bool,
    ) -> Result<(), WorkspaceError> {
        let repo = self.repo()?;
        let commit = self.resolve_commit(&repo, commit_id, None)?;

        let ref_name = format!("refs/heads/{name}");
        if repo.find_reference(&ref_name).is_ok() {
            repo.reference(&ref_name, commit.id(), true, "move branch")
                .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        } else {
            repo.branch(name, &commit, true)
                .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        }

        if checkout {
            repo.set_head(&ref_name)
                .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
            repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
                .map_err(|e| WorkspaceError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn describe_head(&self) -> Result<HeadDescription, WorkspaceError> {
        let repo = self.repo()?;
        let commit = repo.head().and_then(|h| h.peel_to_commit()).ok();
        let branch = repo
            .head()
            .ok()
            .filter(|h| h.is_branch())
            .and_then(|h| h.shorthand().map(String::from));

        let is_dirty = if commit.is_some() {
            !repo
                .statuses(None)
                .map(|statuses| statuses.is_empty())
                .unwrap_or(true)
        } else {
            false
        };

        Ok(HeadDescription {
            commit: commit.map(|c| c.id().to_string()),
            branch,
            is_dirty,
        })
    }
}

/// Builds a `WorkspaceState` trait object for `internal_root`: Git-backed when `enabled`,
/// otherwise the null backend.
pub fn build_state(internal_root: &Path, enabled: bool) -> Result<Box<dyn WorkspaceState>, WorkspaceError> {
    if enabled {
        Ok(Box::new(GitState::open_or_init(internal_root)?))
    } else {
        Ok(Box::new(NullState))
    }
}
