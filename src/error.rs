// src/error.rs
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the probe
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Error type for the vcprobe library
///
/// Every variant is fatal for a probe run; the binary decides termination.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Error getting current directory: {0}")]
    WorkingDirectory(io::Error),

    #[error("Error writing to file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
