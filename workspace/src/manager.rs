//! Workspace Manager: picks a fresh token and builds a [`Workspace`] for a new session.

use std::path::PathBuf;

use rand::RngCore;

use crate::error::WorkspaceError;
use crate::state::build_state;
use crate::workspace::Workspace;

/// Process-wide configuration for workspace construction. Distinct from a single session's
/// [`Workspace`]: this is the factory's config, not a session's state.
#[derive(Clone, Debug)]
pub struct WorkspaceManagerConfig {
    /// Real on-disk directory new workspaces are created under.
    pub base_dir: PathBuf,
    /// POSIX root used to build each workspace's agent-visible `mount` path. Default `/mnt`.
    pub mount_root: String,
    /// Whether newly created workspaces get a Git-backed state or the null backend.
    pub snapshots_enabled: bool,
    /// Cap on snapshots reported to clients.
    pub max_reported_snapshots: usize,
}

impl Default for WorkspaceManagerConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("okcvm-workspaces"),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: true,
            max_reported_snapshots: 20,
        }
    }
}

pub struct WorkspaceManager {
    config: WorkspaceManagerConfig,
}

impl WorkspaceManager {
    pub fn new(config: WorkspaceManagerConfig) -> Self {
        Self { config }
    }

    pub fn max_reported_snapshots(&self) -> usize {
        self.config.max_reported_snapshots
    }

    /// Creates a fresh, isolated workspace: random 128-bit token rendered as hex, eagerly
    /// creates `internal_output`, and wires up the configured snapshot backend.
    pub fn create_workspace(&self) -> Result<Workspace, WorkspaceError> {
        let token = random_token();
        let state = build_state(
            &self.config.base_dir.join(format!("okcvm-{token}")),
            self.config.snapshots_enabled,
        )?;
        Workspace::new(token, &self.config.mount_root, &self.config.base_dir, state)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_workspace_eagerly_creates_output_dir() {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: dir.path().to_path_buf(),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        });
        let ws = manager.create_workspace().unwrap();
        assert!(ws.internal_output.exists());
        assert!(ws.mount.starts_with("/mnt/okcvm-"));
    }

    #[test]
    fn two_workspaces_get_distinct_tokens_and_roots() {
        let dir = tempdir().unwrap();
        let manager = WorkspaceManager::new(WorkspaceManagerConfig {
            base_dir: dir.path().to_path_buf(),
            mount_root: "/mnt".to_string(),
            snapshots_enabled: false,
            max_reported_snapshots: 20,
        });
        let a = manager.create_workspace().unwrap();
        let b = manager.create_workspace().unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.internal_root, b.internal_root);
    }
}
