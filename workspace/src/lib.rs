//! Workspace Manager: per-session filesystem sandbox, path resolution, prompt
//! adaptation, and a pluggable versioned-state backend.

mod error;
mod manager;
mod path;
mod state;
mod workspace;

pub use error::WorkspaceError;
pub use manager::{WorkspaceManager, WorkspaceManagerConfig};
pub use state::{build_state, GitState, HeadDescription, NullState, SnapshotInfo, WorkspaceState};
pub use workspace::{Workspace, LEGACY_MOUNT_PATH, LEGACY_OUTPUT_PATH};
