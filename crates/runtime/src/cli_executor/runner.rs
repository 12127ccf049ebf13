//! Invocation and process-runner types
//!
//! An [`Invocation`] is one fully-resolved request to run an external CLI:
//! executable, ordered argv, working directory, environment and limits. A
//! [`ProcessRunner`] turns it into either buffered output or a classified
//! [`ProcessError`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProcessError;

/// Default cap on combined stdout+stderr bytes captured from one process.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 128 * 1024 * 1024;

/// One logical process run, rebuilt from options and prompt for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Path or name of the executable.
    pub executable: String,
    /// Ordered argument vector (prompt last).
    pub args: Vec<String>,
    /// Working directory for the child.
    pub cwd: PathBuf,
    /// Complete environment for the child; nothing else is inherited.
    pub env: BTreeMap<String, String>,
    /// Wall-clock budget before the graceful termination signal is sent.
    pub timeout: Duration,
    /// Cap on combined captured stdout+stderr bytes.
    pub max_output_bytes: usize,
}

impl Invocation {
    /// Create an invocation with the current process environment and
    /// working directory, default timeout of two minutes and default cap.
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            cwd: current_dir(),
            env: inherited_env(),
            timeout: Duration::from_secs(120),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Sets the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the output cap.
    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }
}

/// Output of a process that exited cleanly with status zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from spawn to reap.
    pub elapsed: Duration,
}

/// Runs one invocation to completion or failure.
///
/// [`CliExecutor`](super::CliExecutor) is the real implementation;
/// [`MockProcessRunner`](super::MockProcessRunner) replays canned outcomes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;
}

/// The calling process's environment, used when no explicit env is given.
pub fn inherited_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// The calling process's working directory, or `.` if it cannot be read.
pub fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
