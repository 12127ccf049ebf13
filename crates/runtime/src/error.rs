//! Error types for CLI invocation and envelope normalization
//!
//! Two layers: [`ProcessError`] describes what happened to one supervised
//! child process, and [`Error`] is what callers of the client, the per-backend
//! flows and the model adapter observe.

use std::time::Duration;

use thiserror::Error;

use crate::client::CliTool;

/// Maximum number of bytes of stderr/stdout attached to a process failure.
pub const MAX_DIAGNOSTIC_BYTES: usize = 8 * 1024;

/// How far the timeout escalation got before the process was reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// The process exited within the grace window after the graceful signal.
    Graceful,
    /// The process ignored the graceful signal and had to be force-killed.
    Forced,
}

impl std::fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutStage::Graceful => write!(f, "terminated"),
            TimeoutStage::Forced => write!(f, "force-killed"),
        }
    }
}

/// Failure of a single supervised process run.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn '{executable}': {source}")]
    SpawnFailed {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {timeout:?} ({stage}){}", with_diagnostics(.diagnostics))]
    Timeout {
        timeout: Duration,
        stage: TimeoutStage,
        diagnostics: String,
    },

    #[error("{}: {diagnostics}", describe_exit(.code, .signal))]
    NonZeroExit {
        code: Option<i32>,
        signal: Option<i32>,
        diagnostics: String,
    },

    #[error("combined stdout/stderr exceeded {limit} bytes; process killed")]
    BufferExceeded { limit: usize },

    #[error("I/O error while supervising '{executable}': {source}")]
    Io {
        executable: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Whether this failure may be retried.
    ///
    /// Only a timeout that ended on the graceful-signal path counts. A
    /// force-killed timeout, an organic non-zero exit, a spawn failure and an
    /// output-cap kill are all surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessError::Timeout {
                stage: TimeoutStage::Graceful,
                ..
            }
        )
    }
}

/// Failure kinds callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SpawnFailed,
    Timeout,
    NonZeroExit,
    BufferExceeded,
    MalformedEnvelope,
    BackendErrorEnvelope,
    Io,
    Schema,
    Config,
}

/// Main error type for calls against a CLI backend.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{} CLI failed: {source}", .tool.cli_name())]
    Process {
        tool: CliTool,
        #[source]
        source: ProcessError,
    },

    #[error("{} CLI returned non-JSON output. First 200 chars:\n{preview}", .tool.cli_name())]
    NonJsonOutput { tool: CliTool, preview: String },

    #[error("{} CLI returned non-object JSON envelope", .tool.cli_name())]
    NonObjectEnvelope { tool: CliTool },

    #[error("{} CLI returned a malformed envelope: {reason}", .tool.cli_name())]
    MalformedEnvelope { tool: CliTool, reason: String },

    #[error("{} CLI error envelope: {subtype}", .tool.cli_name())]
    BackendErrorEnvelope { tool: CliTool, subtype: String },

    #[error("{} CLI did not write its output file '{path}': {source}", .tool.cli_name())]
    MissingOutputFile {
        tool: CliTool,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("failed to serialize JSON schema: {0}")]
    SchemaSerialization(#[source] serde_json::Error),

    #[error("structured output does not match the requested type: {0}")]
    StructuredDecode(#[source] serde_json::Error),

    #[error("failed to serialize structured output: {0}")]
    StructuredEncode(#[source] serde_json::Error),

    #[error("object-json mode requires a JSON schema")]
    MissingSchema,

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Classify this error into the coarse failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Process { source, .. } => match source {
                ProcessError::SpawnFailed { .. } => ErrorKind::SpawnFailed,
                ProcessError::Timeout { .. } => ErrorKind::Timeout,
                ProcessError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
                ProcessError::BufferExceeded { .. } => ErrorKind::BufferExceeded,
                ProcessError::Io { .. } => ErrorKind::Io,
            },
            Error::NonJsonOutput { .. }
            | Error::NonObjectEnvelope { .. }
            | Error::MalformedEnvelope { .. }
            | Error::StructuredDecode(_)
            | Error::StructuredEncode(_) => ErrorKind::MalformedEnvelope,
            Error::BackendErrorEnvelope { .. } => ErrorKind::BackendErrorEnvelope,
            Error::MissingOutputFile { .. } | Error::TempDir(_) => ErrorKind::Io,
            Error::SchemaSerialization(_) | Error::MissingSchema => ErrorKind::Schema,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("exited with code={}", code),
        (None, Some(signal)) => format!("terminated by signal {}", signal),
        (None, None) => "exited abnormally (code=?)".to_string(),
    }
}

fn with_diagnostics(diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        String::new()
    } else {
        format!(": {}", diagnostics)
    }
}

/// Pick the diagnostic text for a failed process: stderr, falling back to
/// stdout, capped at [`MAX_DIAGNOSTIC_BYTES`].
pub(crate) fn diagnostics_from(stdout: &str, stderr: &str) -> String {
    let source = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    let trimmed = source.trim();
    if trimmed.len() <= MAX_DIAGNOSTIC_BYTES {
        return trimmed.to_string();
    }
    let mut end = MAX_DIAGNOSTIC_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n... [output truncated at {} bytes]",
        &trimmed[..end],
        MAX_DIAGNOSTIC_BYTES
    )
}

/// First `limit` characters of `text`, for error previews.
pub(crate) fn preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
