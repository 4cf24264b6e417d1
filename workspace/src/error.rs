//! Workspace-layer errors.

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("path must not be empty")]
    EmptyPath,
    #[error("path escapes workspace: {0}")]
    Escape(String),
    #[error("filesystem error: {0}")]
    Io(String),
    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(String),
    #[error("unknown branch: {0}")]
    UnknownBranch(String),
    #[error("snapshot backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for WorkspaceError {
    fn from(e: std::io::Error) -> Self {
        WorkspaceError::Io(e.to_string())
    }
}
