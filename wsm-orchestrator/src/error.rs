use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Clone failed: {0}")]
    CloneFailed(String),
}

/// Failure outcome of a single step.
///
/// `Retry` is re-invoked by the runner under its retry policy. `Fatal` stops
/// forward progress and starts compensation.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepError {
    #[error("retryable: {0}")]
    Retry(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl StepError {
    pub fn retry(message: impl Into<String>) -> Self {
        StepError::Retry(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        StepError::Fatal(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Retry(_))
    }

    pub fn message(&self) -> &str {
        match self {
            StepError::Retry(m) | StepError::Fatal(m) => m,
        }
    }
}

/// Errors reported by external collaborators (stores, provisioners, policy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<CollaboratorError> for StepError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Transient(_) => StepError::Retry(err.to_string()),
            _ => StepError::Fatal(err.to_string()),
        }
    }
}

/// Errors from the durable operation executor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("timed out waiting for operation {0}")]
    Timeout(String),

    #[error("operation {0} not found")]
    NotFound(String),

    #[error("no flight registered for operation kind {0}")]
    UnknownKind(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<ExecutorError> for StepError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Timeout(_) | ExecutorError::Storage(_) => {
                StepError::Retry(err.to_string())
            }
            ExecutorError::NotFound(_) | ExecutorError::UnknownKind(_) => {
                StepError::Fatal(err.to_string())
            }
        }
    }
}

impl From<OrchestratorError> for ExecutorError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Executor(e) => e,
            other => ExecutorError::Storage(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for StepError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Database(_) | OrchestratorError::Io(_) => {
                StepError::Retry(err.to_string())
            }
            OrchestratorError::Executor(e) => e.into(),
            OrchestratorError::Collaborator(e) => e.into(),
            other => StepError::Fatal(other.to_string()),
        }
    }
}
