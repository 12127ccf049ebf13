//! Prelude for applications calling AI CLIs.
//!
//! ```ignore
//! use envelope_runtime::prelude::*;
//! ```

// Clients
pub use crate::client::{
    CliClient, CliClientExt, CliTool, GenerateStructuredArgs, GenerateTextArgs, ToolClient,
};

// Backend options
pub use crate::cli_executor::{ClaudeCodeOptions, CodexOptions, PermissionMode, SandboxMode};

// Model adapter
pub use crate::language_model::{CallOptions, CliLanguageModel, LanguageModel, PromptMessage};

// Typed tasks
pub use crate::schema::json_schema_for;
pub use crate::task::{TaskError, TypedTask};

// Errors
pub use crate::error::{Error, ErrorKind, Result};
