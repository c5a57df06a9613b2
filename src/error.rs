use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobShuttleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Job record error: {0}")]
    Record(String),
}

impl JobShuttleError {
    /// Returns true for errors that were produced by exhausting a retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, JobShuttleError::TransientIo(_))
    }
}

pub type Error = JobShuttleError;
pub type Result<T> = std::result::Result<T, Error>;
