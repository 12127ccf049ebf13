//! CLI executor module for AI tool invocation
//!
//! Supervised process runner plus per-backend adapters for driving the
//! Claude Code and Codex CLIs as one-shot request/response calls.

pub mod adapters;
pub mod envelope;
pub mod executor;
pub mod mock;
pub mod retry;
pub mod runner;
pub mod watchdog;

pub use adapters::{
    ClaudeCodeOptions, CodexOptions, CodexStructuredOutput, PermissionMode,
    ResolvedClaudeCodeOptions, ResolvedCodexOptions, SandboxMode,
};
pub use envelope::ClaudeEnvelope;
pub use executor::{CliExecutor, CliExecutorConfig};
pub use mock::MockProcessRunner;
pub use retry::{RetryPolicy, RetryWrapper};
pub use runner::{Invocation, ProcessOutput, ProcessRunner, DEFAULT_MAX_OUTPUT_BYTES};
pub use watchdog::{KillStage, KillTimer, OutputCapture};
