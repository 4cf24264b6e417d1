#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("source directory not found: {0}")]
    SourceNotFound(String),
    #[error("no entry html file found in source directory")]
    NoEntryFile,
    #[error("ambiguous entry file: more than one .html file at source root")]
    AmbiguousEntryFile,
    #[error("deployment target already exists (use force to overwrite): {0}")]
    TargetExists(String),
    #[error("could not allocate a free deployment id")]
    IdSpaceExhausted,
    #[error("io error: {0}")]
    Io(String),
    #[error("deployment not found: {0}")]
    NotFound(String),
    #[error("path escapes deployment directory: {0}")]
    PathEscape(String),
}

impl From<std::io::Error> for DeployError {
    fn from(e: std::io::Error) -> Self {
        DeployError::Io(e.to_string())
    }
}
