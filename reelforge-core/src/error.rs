use thiserror::Error;

/// Error taxonomy for the artifact/job subsystem.
///
/// Variants map to a fixed error-kind vocabulary (invalid-input,
/// tool-missing, worker-runtime, timeout, canceled, conflict, filesystem) so
/// that HTTP-layer code can translate a single enum into status codes
/// without re-deriving the taxonomy.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("required tool missing: {0}")]
    ToolMissing(String),

    #[error("operation canceled: {0}")]
    Cancelled(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("worker failed: {0}")]
    WorkerRuntime(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
