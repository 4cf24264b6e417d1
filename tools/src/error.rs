//! Tool Result error taxonomy: every tool failure collapses into a
//! `ToolResult { success: false, error: Some(one-line message) }`; this enum exists to keep
//! each tool's failure classified while it's being constructed.

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    WorkspaceViolation(String),
    #[error("{0}")]
    Subprocess(String),
    #[error("{0}")]
    ExternalService(String),
    #[error("tool '{0}' is not implemented in this build")]
    NotImplemented(String),
}

impl ToolError {
    pub fn into_result(self) -> okcvm_protocol::ToolResult {
        okcvm_protocol::ToolResult::failure(self.to_string())
    }
}

/// Registration/manifest-loading errors: these abort startup rather than
/// surfacing as a Tool Result.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("malformed manifest: {0}")]
    Manifest(String),
    #[error("tool spec '{name}' is malformed: {reason}")]
    InvalidSpec { name: String, reason: String },
}
