//! Envelope runtime
//!
//! Treats a locally installed AI command-line tool (Claude Code or Codex) as a
//! single request/response call: builds the backend's invocation, supervises
//! the child process, retries transient failures and normalizes whatever the
//! tool produced into a text or structured result.

pub mod cli_executor;
pub mod client;
pub mod config;
pub mod error;
pub mod language_model;
pub mod prelude;
pub mod schema;
pub mod task;

// Re-export commonly used types
pub use cli_executor::adapters::{claude_code, codex};
pub use cli_executor::{
    ClaudeCodeOptions, ClaudeEnvelope, CliExecutor, CliExecutorConfig, CodexOptions,
    Invocation, ProcessOutput, ProcessRunner, RetryPolicy,
};
pub use client::{
    Backend, CliClient, CliClientExt, CliTool, GenerateStructuredArgs, GenerateTextArgs,
    StructuredResponse, TextResponse, ToolClient,
};
pub use config::{ConfigError, EnvelopeConfig};
pub use error::{Error, ErrorKind, ProcessError, Result, TimeoutStage};
pub use language_model::{CliLanguageModel, LanguageModel};
pub use task::{TaskError, TypedTask};
