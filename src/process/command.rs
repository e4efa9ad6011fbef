use std::collections::{HashMap, VecDeque};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::process::{ProcessError, ProcessResult};

/// Number of trailing stderr lines kept for diagnostics
const STDERR_TAIL: usize = 20;

/// Command wrapper for process execution
#[derive(Debug, Clone)]
pub struct Command {
    /// Program to execute
    program: String,

    /// Arguments to pass to the program
    args: Vec<String>,

    /// Whether to capture stdout
    capture_stdout: bool,

    /// Whether to capture stderr
    capture_stderr: bool,

    /// Environment variables
    env_vars: HashMap<String, String>,
}

impl Command {
    /// Create a new command
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            capture_stdout: false,
            capture_stderr: false,
            env_vars: HashMap::new(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// Set whether to capture stdout
    pub fn capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }

    /// Set whether to capture stderr
    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }

    /// Add an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.insert(key.into(), val.into());
        self
    }

    /// Program this command runs
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Value of an environment variable set on this command
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env_vars.get(key).map(String::as_str)
    }

    /// Execute the command and return a handle to the process
    pub fn spawn(&self) -> ProcessResult<ProcessHandle> {
        // Arguments may carry paths but never secrets; env vars are not logged.
        debug!("Spawning command: {} {:?}", self.program, self.args);

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);

        for (key, val) in &self.env_vars {
            cmd.env(key, val);
        }

        if self.capture_stdout {
            cmd.stdout(Stdio::piped());
        }

        if self.capture_stderr {
            cmd.stderr(Stdio::piped());
        }

        let child = cmd.spawn().map_err(ProcessError::SpawnError)?;

        Ok(ProcessHandle {
            child,
            program: self.program.clone(),
        })
    }
}

/// Output of a process that ran to completion
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit status of the process
    pub status: ExitStatus,

    /// Lines written to stdout
    pub stdout: Vec<String>,

    /// Last lines written to stderr
    pub stderr_tail: Vec<String>,
}

/// Handle to a running process
pub struct ProcessHandle {
    /// Child process
    child: Child,

    /// Program name
    program: String,
}

impl ProcessHandle {
    /// Read all of stdout and wait for exit, killing the process once the deadline passes
    pub async fn wait_with_output(mut self, deadline: Duration) -> ProcessResult<ProcessOutput> {
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::Other("Stdout not captured".to_string()))?;

        let stderr_task = self
            .child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_logger(self.program.clone(), stderr));

        let program = self.program.clone();
        let child = &mut self.child;
        let collected = timeout(deadline, async {
            let mut lines = Vec::new();
            let mut reader = BufReader::new(stdout).lines();
            while let Some(line) = reader.next_line().await.map_err(ProcessError::ReadError)? {
                trace!("[{}] stdout: {}", program, line);
                lines.push(line);
            }
            let status = child.wait().await.map_err(ProcessError::SpawnError)?;
            Ok::<_, ProcessError>((lines, status))
        })
        .await;

        let (stdout, status) = match collected {
            Ok(result) => result?,
            Err(_) => {
                warn!("[{}] did not finish within {:?}, killing it", self.program, deadline);
                if let Err(e) = self.child.kill().await {
                    warn!("[{}] failed to kill process: {}", self.program, e);
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(ProcessError::Timeout(deadline));
            }
        };

        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(ProcessOutput {
            status,
            stdout,
            stderr_tail,
        })
    }
}

/// Log stderr lines as they arrive and keep the last few for diagnostics
fn spawn_stderr_logger<R>(program: String, stderr: R) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL);
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            debug!("[{}] stderr: {}", program, line);
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail)
    })
}
