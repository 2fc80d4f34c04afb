use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Retryable failure that persisted through every allowed attempt.
    #[error("Control plane unavailable after {attempts} attempt(s) (code {code}): {message}")]
    RemoteUnavailable {
        code: u16,
        attempts: u32,
        message: String,
    },

    /// Non-retryable response from the control plane.
    #[error("Control plane rejected request (code {code}): {message}")]
    Remote { code: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{} of {} bulk operation(s) failed: {}", failed.len(), failed.len() + succeeded, failed.join(", "))]
    BulkOperation {
        failed: Vec<String>,
        succeeded: usize,
    },

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// HTTP-style status code carried by remote failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RemoteUnavailable { code, .. } | Self::Remote { code, .. } => Some(*code),
            Self::NotFound(_) => Some(404),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
