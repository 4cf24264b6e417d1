//! The per-session sandbox itself.

use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;
use crate::path::normalize_path;
use crate::state::{HeadDescription, SnapshotInfo, WorkspaceState};

/// Legacy literal paths the base system prompt hard-codes; every session's prompt gets these
/// replaced with its own mount/output paths.
pub const LEGACY_OUTPUT_PATH: &str = "/mnt/okcomputer/output/";
pub const LEGACY_MOUNT_PATH: &str = "/mnt/okcomputer/";

/// One session's isolated filesystem sandbox.
///
/// Invariant: every path returned by [`Workspace::resolve`] has `internal_root` as a prefix
///. `state` is `None` for the null backend's absence of identity — callers use
/// [`Workspace::state`] to reach snapshot operations regardless of which backend is active.
pub struct Workspace {
    pub token: String,
    pub mount: String,
    pub output: String,
    pub internal_root: PathBuf,
    pub internal_output: PathBuf,
    pub internal_mount: PathBuf,
    pub internal_tmp: PathBuf,
    state: Box<dyn WorkspaceState>,
}

impl Workspace {
    pub(crate) fn new(
        token: String,
        mount_root: &str,
        base_dir: &Path,
        state: Box<dyn WorkspaceState>,
    ) -> Result<Self, WorkspaceError> {
        let mount_root = mount_root.trim_end_matches('/');
        let mount = format!("{mount_root}/okcvm-{token}/");
        let output = format!("{mount}output/");

        let internal_root = base_dir.join(format!("okcvm-{token}"));
        std::fs::create_dir_all(&internal_root)?;
        let internal_root = internal_root.canonicalize()?;

        let internal_output = internal_root.join("output");
        std::fs::create_dir_all(&internal_output)?;
        let internal_tmp = internal_root.join("tmp");
        std::fs::create_dir_all(&internal_tmp)?;
        let internal_mount = internal_root.clone();

        Ok(Self {
            token,
            mount,
            output,
            internal_root,
            internal_output,
            internal_mount,
            internal_tmp,
            state,
        })
    }

    pub fn state(&self) -> &dyn WorkspaceState {
        self.state.as_ref()
    }

    /// Resolves an agent-supplied path string into a safe real path.
    pub fn resolve(&self, path_param: &str) -> Result<PathBuf, WorkspaceError> {
        if path_param.is_empty() {
            return Err(WorkspaceError::EmptyPath);
        }

        let posix = path_param.replace('\\', "/");
        let mount_trimmed = self.mount.trim_end_matches('/');

        let anchored = if posix.starts_with('/') {
            if let Some(rest) = posix.strip_prefix(mount_trimmed) {
                // absolute, under our mount: strip the mount prefix.
                self.internal_root.join(rest.trim_start_matches('/'))
            } else {
                // absolute, outside our mount: anchor the de-rooted remainder.
                self.internal_root.join(posix.trim_start_matches('/'))
            }
        } else {
            // relative: anchor as-is.
            self.internal_root.join(&posix)
        };

        let normalized = normalize_path(&anchored);
        if !normalized.starts_with(&self.internal_root) {
            return Err(WorkspaceError::Escape(path_param.to_string()));
        }

        if normalized.exists() {
            let resolved = normalized.canonicalize()?;
            if !resolved.starts_with(&self.internal_root) {
                return Err(WorkspaceError::Escape(path_param.to_string()));
            }
            Ok(resolved)
        } else {
            Ok(normalized)
        }
    }

    /// Replaces legacy hard-coded paths in the base system prompt with this session's own
    /// mount/output paths. Output must be replaced before mount since it's a superset
    /// string of the mount path.
    pub fn adapt_prompt(&self, base_prompt: &str) -> String {
        base_prompt
            .replace(LEGACY_OUTPUT_PATH, &self.output)
            .replace(LEGACY_MOUNT_PATH, &self.mount)
    }

    /// Idempotent recursive delete of `internal_root`. Returns whether it existed.
    pub fn cleanup(&self) -> Result<bool, WorkspaceError> {
        if self.internal_root.exists() {
            std::fs::remove_dir_all(&self.internal_root)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn snapshot(&self, label: Option<&str>) -> Result<Option<String>, WorkspaceError> {
        self.state.snapshot(label)
    }

    pub fn list_snapshots(&self, limit: usize) -> Result<Vec<SnapshotInfo>, WorkspaceError> {
        self.state.list_snapshots(limit)
    }

    pub fn restore(
        &self,
        commit_id: Option<&str>,
        branch: Option<&str>,
        checkout: bool,
    ) -> Result<bool, WorkspaceError> {
        self.state.restore(commit_id, branch, checkout)
    }

    pub fn ensure_branch(
        &self,
        name: &str,
        commit_id: Option<&str>,
        checkout: bool,
    ) -> Result<(), WorkspaceError> {
        self.state.ensure_branch(name, commit_id, checkout)
    }

    pub fn describe_head(&self) -> Result<HeadDescription, WorkspaceError> {
        self.state.describe_head()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NullState;
    use tempfile::tempdir;

    fn ws(base: &Path) -> Workspace {
        Workspace::new(
            "abc123".to_string(),
            "/mnt",
            base,
            Box::new(NullState),
        )
        .unwrap()
    }

    #[test]
    fn resolve_rejects_empty_path() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        assert!(matches!(w.resolve(""), Err(WorkspaceError::EmptyPath)));
    }

    #[test]
    fn resolve_relative_path_anchors_under_internal_root() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        let resolved = w.resolve("notes.txt").unwrap();
        assert_eq!(resolved, w.internal_root.join("notes.txt"));
    }

    #[test]
    fn resolve_absolute_under_mount_strips_mount_prefix() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        let path_param = format!("{}output/a.txt", w.mount);
        let resolved = w.resolve(&path_param).unwrap();
        assert_eq!(resolved, w.internal_root.join("output").join("a.txt"));
    }

    #[test]
    fn resolve_absolute_outside_mount_anchors_derooted_remainder() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        let resolved = w.resolve("/tmp/foo").unwrap();
        assert_eq!(resolved, w.internal_root.join("tmp").join("foo"));
    }

    #[test]
    fn resolve_rejects_escape_via_parent_dirs() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        let err = w.resolve("../../../../../../etc/passwd");
        assert!(matches!(err, Err(WorkspaceError::Escape(_))));
    }

    #[test]
    fn adapt_prompt_replaces_legacy_paths() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        let base = "Write files under /mnt/okcomputer/output/ and read from /mnt/okcomputer/.";
        let adapted = w.adapt_prompt(base);
        assert!(adapted.contains(&w.output));
        assert!(adapted.contains(&w.mount));
        assert!(!adapted.contains("okcomputer"));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempdir().unwrap();
        let w = ws(dir.path());
        assert!(w.cleanup().unwrap());
        assert!(!w.cleanup().unwrap());
    }
}
