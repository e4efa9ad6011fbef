use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Result type for process operations
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

/// Errors that can occur while running an external collector process
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnError(#[from] io::Error),

    #[error("Process exited with non-zero status: {0}")]
    NonZeroExit(ExitStatus),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to read from process: {0}")]
    ReadError(io::Error),

    #[error("Process output parse error: {0}")]
    ParseError(String),

    #[error("Other process error: {0}")]
    Other(String),
}

impl From<ProcessError> for crate::error::ProbeError {
    fn from(err: ProcessError) -> Self {
        crate::error::ProbeError::Collection(err.to_string())
    }
}
