//! Per-backend argument builders and call flows.

pub mod claude_code;
pub mod codex;

pub use claude_code::{ClaudeCodeOptions, PermissionMode, ResolvedClaudeCodeOptions};
pub use codex::{CodexOptions, CodexStructuredOutput, ResolvedCodexOptions, SandboxMode};

use std::sync::Arc;

use super::retry::{RetryPolicy, RetryWrapper};
use super::runner::{Invocation, ProcessOutput, ProcessRunner};
use crate::client::CliTool;
use crate::error::{Error, Result};

/// Run one invocation under the retry coordinator, tagging failures with the
/// backend that produced them.
pub(crate) async fn run_supervised(
    tool: CliTool,
    runner: Arc<dyn ProcessRunner>,
    policy: RetryPolicy,
    invocation: Invocation,
) -> Result<ProcessOutput> {
    RetryWrapper::new(runner, policy)
        .run(&invocation)
        .await
        .map_err(|source| Error::Process { tool, source })
}
