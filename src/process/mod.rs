//! Process management for external metric collectors
//!
//! The collection engine runs as a child process. This module spawns it,
//! captures its stdout, logs its stderr, and enforces a hard deadline.

mod command;
mod error;

pub use command::{Command, ProcessHandle, ProcessOutput};
pub use error::{ProcessError, ProcessResult};
