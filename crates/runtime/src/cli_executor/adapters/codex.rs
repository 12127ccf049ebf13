//! Codex backend
//!
//! Runs OpenAI's Codex CLI via `codex exec`. Codex does not print an envelope;
//! its final message goes to the file named by `--output-last-message` and,
//! for structured calls, the schema is read from `--output-schema`. Both
//! files live in a temporary directory owned by the call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;

use super::claude_code::{push_list, push_scalar};
use super::run_supervised;
use crate::cli_executor::envelope;
use crate::cli_executor::executor::CliExecutor;
use crate::cli_executor::retry::RetryPolicy;
use crate::cli_executor::runner::{
    current_dir, inherited_env, Invocation, ProcessOutput, ProcessRunner,
    DEFAULT_MAX_OUTPUT_BYTES,
};
use crate::client::{CliTool, TextResponse};
use crate::error::{Error, ProcessError, Result};

pub const DEFAULT_EXECUTABLE: &str = "codex";
pub const DEFAULT_MODEL: &str = "gpt-5.3-codex";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

const SCRATCH_PREFIX: &str = "envelope-codex-";
const SCHEMA_FILE: &str = "schema.json";
const LAST_MESSAGE_FILE: &str = "last.txt";

/// Value of `--sandbox`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    ReadOnly,
    WorkspaceWrite,
    #[default]
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

/// Caller-facing options. Unset fields take their defaults in
/// [`CodexOptions::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexOptions {
    pub codex_path: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: Option<BTreeMap<String, String>>,
    pub model: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
    pub skip_git_repo_check: Option<bool>,
    pub sandbox: Option<SandboxMode>,
    pub profile: Option<String>,
    /// `key=value` overrides, one `--config` each.
    pub config: Vec<String>,
    /// Emit JSONL events on stdout (`--json`).
    pub jsonl_events: bool,
    pub image: Vec<PathBuf>,
    pub max_output_bytes: Option<usize>,
}

/// Fully-populated options; empty strings mean "omit the flag".
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCodexOptions {
    pub codex_path: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub skip_git_repo_check: bool,
    pub sandbox: SandboxMode,
    pub profile: String,
    pub config: Vec<String>,
    pub jsonl_events: bool,
    pub image: Vec<String>,
    pub max_output_bytes: usize,
}

impl CodexOptions {
    pub fn resolve(&self) -> ResolvedCodexOptions {
        let retry_defaults = RetryPolicy::default();
        ResolvedCodexOptions {
            codex_path: self
                .codex_path
                .clone()
                .unwrap_or_else(|| DEFAULT_EXECUTABLE.to_string()),
            cwd: self.cwd.clone().unwrap_or_else(current_dir),
            env: self.env.clone().unwrap_or_else(inherited_env),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            retry: RetryPolicy::new(
                self.retries.unwrap_or(retry_defaults.retries),
                self.retry_delay.unwrap_or(retry_defaults.delay),
            ),
            skip_git_repo_check: self.skip_git_repo_check.unwrap_or(true),
            sandbox: self.sandbox.unwrap_or_default(),
            profile: self.profile.clone().unwrap_or_default(),
            config: self.config.clone(),
            jsonl_events: self.jsonl_events,
            image: self.image.iter().map(|p| path_arg(p)).collect(),
            max_output_bytes: self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
        }
    }
}

impl Default for ResolvedCodexOptions {
    fn default() -> Self {
        CodexOptions::default().resolve()
    }
}

/// Flags shared by text and structured calls.
pub fn base_args(options: &ResolvedCodexOptions) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if options.skip_git_repo_check {
        args.push("--skip-git-repo-check".to_string());
    }
    push_scalar(&mut args, "-C", &path_arg(&options.cwd));
    push_scalar(&mut args, "--model", &options.model);
    args.push("--sandbox".to_string());
    args.push(options.sandbox.as_str().to_string());
    push_scalar(&mut args, "--profile", &options.profile);
    push_list(&mut args, "--config", &options.config);
    if options.jsonl_events {
        args.push("--json".to_string());
    }
    push_list(&mut args, "--image", &options.image);
    args
}

pub fn text_args(options: &ResolvedCodexOptions, last_message: &Path, prompt: &str) -> Vec<String> {
    let mut args = base_args(options);
    args.push("--output-last-message".to_string());
    args.push(path_arg(last_message));
    args.push(prompt.to_string());
    args
}

pub fn structured_args(
    options: &ResolvedCodexOptions,
    schema_file: &Path,
    last_message: &Path,
    prompt: &str,
) -> Vec<String> {
    let mut args = base_args(options);
    args.push("--output-schema".to_string());
    args.push(path_arg(schema_file));
    args.push("--output-last-message".to_string());
    args.push(path_arg(last_message));
    args.push(prompt.to_string());
    args
}

pub fn invocation(options: &ResolvedCodexOptions, args: Vec<String>) -> Invocation {
    Invocation {
        executable: options.codex_path.clone(),
        args,
        cwd: options.cwd.clone(),
        env: options.env.clone(),
        timeout: options.timeout,
        max_output_bytes: options.max_output_bytes,
    }
}

/// Structured result of a Codex call: the parsed value and the file text it
/// came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CodexStructuredOutput {
    pub structured: Value,
    pub raw: String,
}

/// Text call through the given runner. The reply is the output file's
/// contents, verbatim.
pub async fn text_with(
    runner: Arc<dyn ProcessRunner>,
    options: &ResolvedCodexOptions,
    prompt: &str,
) -> Result<String> {
    let scratch = scratch_dir()?;
    let last_message = scratch.path().join(LAST_MESSAGE_FILE);

    let args = text_args(options, &last_message, prompt);
    let runner = FreshOutputFile::wrap(runner, &last_message);
    run_supervised(CliTool::Codex, runner, options.retry, invocation(options, args)).await?;
    read_last_message(&last_message).await
}

/// Structured call through the given runner.
pub async fn structured_with(
    runner: Arc<dyn ProcessRunner>,
    options: &ResolvedCodexOptions,
    json_schema: &Value,
    prompt: &str,
) -> Result<CodexStructuredOutput> {
    let schema = serde_json::to_string(json_schema).map_err(Error::SchemaSerialization)?;
    let scratch = scratch_dir()?;
    let schema_file = scratch.path().join(SCHEMA_FILE);
    let last_message = scratch.path().join(LAST_MESSAGE_FILE);
    tokio::fs::write(&schema_file, schema)
        .await
        .map_err(Error::TempDir)?;

    let args = structured_args(options, &schema_file, &last_message, prompt);
    let runner = FreshOutputFile::wrap(runner, &last_message);
    run_supervised(CliTool::Codex, runner, options.retry, invocation(options, args)).await?;

    let raw = read_last_message(&last_message).await?;
    let structured = envelope::parse_output_file(CliTool::Codex, &raw)?;
    Ok(CodexStructuredOutput { structured, raw })
}

/// Text call with the default process supervisor.
pub async fn text(prompt: &str, options: &CodexOptions) -> Result<TextResponse> {
    let text = text_with(Arc::new(CliExecutor::default()), &options.resolve(), prompt).await?;
    Ok(TextResponse { text })
}

/// Structured call with the default process supervisor.
pub async fn structured(
    prompt: &str,
    json_schema: &Value,
    options: &CodexOptions,
) -> Result<CodexStructuredOutput> {
    structured_with(
        Arc::new(CliExecutor::default()),
        &options.resolve(),
        json_schema,
        prompt,
    )
    .await
}

/// Removes the output file before every attempt so a retried run can never
/// read back the message left by an earlier one.
struct FreshOutputFile {
    inner: Arc<dyn ProcessRunner>,
    path: PathBuf,
}

impl FreshOutputFile {
    fn wrap(inner: Arc<dyn ProcessRunner>, path: &Path) -> Arc<dyn ProcessRunner> {
        Arc::new(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl ProcessRunner for FreshOutputFile {
    async fn run(
        &self,
        invocation: &Invocation,
    ) -> std::result::Result<ProcessOutput, ProcessError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed stale output file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ProcessError::Io {
                    executable: invocation.executable.clone(),
                    source,
                })
            }
        }
        self.inner.run(invocation).await
    }
}

/// Per-call scratch directory, removed when the returned guard drops.
fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir()
        .map_err(Error::TempDir)
}

async fn read_last_message(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::MissingOutputFile {
            tool: CliTool::Codex,
            path: path_arg(path),
            source,
        })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
