use thiserror::Error;

pub type Result<T, E = CairnError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CairnError {
    /// A thought record (or config value) violated its schema.
    #[error("validation error: {field}: {reason}")]
    Validation { field: String, reason: String },
    /// Directory setup or backend init failed; the instance never became active.
    #[error("initialization failed: {0}")]
    Initialization(String),
    /// A version-control subprocess exited non-zero.
    #[error("command failed: `{command}`: {stderr}")]
    CommandExecution { command: String, stderr: String },
    #[error("remote sync failed: {0}")]
    RemoteSync(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },
    #[error("unsupported by backend: {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CairnError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Remote sync and export problems never invalidate local history.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RemoteSync(_) | Self::Export(_))
    }
}
