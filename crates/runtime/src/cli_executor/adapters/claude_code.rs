//! Claude Code backend
//!
//! Runs Anthropic's Claude Code CLI in print mode (`-p`) with
//! `--output-format json`, so every call yields one JSON envelope on stdout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run_supervised;
use crate::cli_executor::envelope::{self, ClaudeEnvelope};
use crate::cli_executor::executor::CliExecutor;
use crate::cli_executor::retry::RetryPolicy;
use crate::cli_executor::runner::{
    current_dir, inherited_env, Invocation, ProcessRunner, DEFAULT_MAX_OUTPUT_BYTES,
};
use crate::client::{CliTool, TextResponse};
use crate::error::{Error, Result};

pub const DEFAULT_EXECUTABLE: &str = "claude";
pub const DEFAULT_MODEL: &str = "opus";
pub const DEFAULT_MAX_BUDGET_USD: f64 = 5.0;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Value of `--permission-mode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
    #[default]
    DontAsk,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::DontAsk => "dontAsk",
            PermissionMode::Plan => "plan",
        }
    }
}

/// Caller-facing options. Unset fields take their defaults in
/// [`ClaudeCodeOptions::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeCodeOptions {
    /// Path or name of the Claude Code executable.
    pub claude_path: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Complete child environment; the calling process's environment if unset.
    pub env: Option<BTreeMap<String, String>>,
    pub model: Option<String>,
    pub max_budget_usd: Option<f64>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Option<Duration>,
    pub permission_mode: Option<PermissionMode>,
    /// Value of `--tools`; `""` disables tools.
    pub tools: Option<String>,
    pub system_prompt: Option<String>,
    pub append_system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub fallback_model: Option<String>,
    pub betas: Vec<String>,
    pub agent: Option<String>,
    /// JSON object of custom agent definitions, passed through verbatim.
    pub agents: Option<String>,
    pub max_output_bytes: Option<usize>,
}

/// Fully-populated options; the only form argument building sees.
/// Empty strings mean "omit the flag".
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClaudeCodeOptions {
    pub claude_path: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub model: String,
    pub max_budget_usd: f64,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub permission_mode: PermissionMode,
    pub tools: String,
    pub system_prompt: String,
    pub append_system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub fallback_model: String,
    pub betas: Vec<String>,
    pub agent: String,
    pub agents: String,
    pub max_output_bytes: usize,
}

impl ClaudeCodeOptions {
    pub fn resolve(&self) -> ResolvedClaudeCodeOptions {
        let retry_defaults = RetryPolicy::default();
        ResolvedClaudeCodeOptions {
            claude_path: self
                .claude_path
                .clone()
                .unwrap_or_else(|| DEFAULT_EXECUTABLE.to_string()),
            cwd: self.cwd.clone().unwrap_or_else(current_dir),
            env: self.env.clone().unwrap_or_else(inherited_env),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_budget_usd: self.max_budget_usd.unwrap_or(DEFAULT_MAX_BUDGET_USD),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            retry: RetryPolicy::new(
                self.retries.unwrap_or(retry_defaults.retries),
                self.retry_delay.unwrap_or(retry_defaults.delay),
            ),
            permission_mode: self.permission_mode.unwrap_or_default(),
            tools: self.tools.clone().unwrap_or_default(),
            system_prompt: self.system_prompt.clone().unwrap_or_default(),
            append_system_prompt: self.append_system_prompt.clone().unwrap_or_default(),
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: self.disallowed_tools.clone(),
            fallback_model: self.fallback_model.clone().unwrap_or_default(),
            betas: self.betas.clone(),
            agent: self.agent.clone().unwrap_or_default(),
            agents: self.agents.clone().unwrap_or_default(),
            max_output_bytes: self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES),
        }
    }
}

impl Default for ResolvedClaudeCodeOptions {
    fn default() -> Self {
        ClaudeCodeOptions::default().resolve()
    }
}

/// Flags shared by text and structured calls.
pub fn base_args(options: &ResolvedClaudeCodeOptions) -> Vec<String> {
    let mut args = vec![
        "--model".to_string(),
        options.model.clone(),
        "-p".to_string(),
        "--permission-mode".to_string(),
        options.permission_mode.as_str().to_string(),
        // Always passed, even empty: "" is how tools are disabled
        "--tools".to_string(),
        options.tools.clone(),
    ];

    push_scalar(&mut args, "--system-prompt", &options.system_prompt);
    push_scalar(
        &mut args,
        "--append-system-prompt",
        &options.append_system_prompt,
    );
    push_list(&mut args, "--allowedTools", &options.allowed_tools);
    push_list(&mut args, "--disallowedTools", &options.disallowed_tools);
    push_scalar(&mut args, "--fallback-model", &options.fallback_model);
    push_list(&mut args, "--betas", &options.betas);
    push_scalar(&mut args, "--agent", &options.agent);
    push_scalar(&mut args, "--agents", &options.agents);

    args
}

/// Full argument vector for a text call.
pub fn text_args(options: &ResolvedClaudeCodeOptions, prompt: &str) -> Vec<String> {
    let mut args = base_args(options);
    push_output_flags(&mut args, options);
    args.push(prompt.to_string());
    args
}

/// Full argument vector for a structured call; `json_schema` is the
/// serialized schema document.
pub fn structured_args(
    options: &ResolvedClaudeCodeOptions,
    json_schema: &str,
    prompt: &str,
) -> Vec<String> {
    let mut args = base_args(options);
    push_output_flags(&mut args, options);
    args.push("--json-schema".to_string());
    args.push(json_schema.to_string());
    args.push(prompt.to_string());
    args
}

fn push_output_flags(args: &mut Vec<String>, options: &ResolvedClaudeCodeOptions) {
    args.push("--max-budget-usd".to_string());
    args.push(options.max_budget_usd.to_string());
    args.push("--output-format".to_string());
    args.push("json".to_string());
}

pub(crate) fn push_scalar(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

pub(crate) fn push_list(args: &mut Vec<String>, flag: &str, values: &[String]) {
    for value in values {
        args.push(flag.to_string());
        args.push(value.clone());
    }
}

pub fn invocation(options: &ResolvedClaudeCodeOptions, args: Vec<String>) -> Invocation {
    Invocation {
        executable: options.claude_path.clone(),
        args,
        cwd: options.cwd.clone(),
        env: options.env.clone(),
        timeout: options.timeout,
        max_output_bytes: options.max_output_bytes,
    }
}

/// Text call through the given runner.
pub async fn text_with(
    runner: Arc<dyn ProcessRunner>,
    options: &ResolvedClaudeCodeOptions,
    prompt: &str,
) -> Result<String> {
    let args = text_args(options, prompt);
    let output = run_supervised(
        CliTool::ClaudeCode,
        runner,
        options.retry,
        invocation(options, args),
    )
    .await?;
    envelope::parse_text(CliTool::ClaudeCode, &output.stdout)
}

/// Structured call through the given runner; returns the whole envelope.
pub async fn structured_with(
    runner: Arc<dyn ProcessRunner>,
    options: &ResolvedClaudeCodeOptions,
    json_schema: &Value,
    prompt: &str,
) -> Result<ClaudeEnvelope> {
    let schema = serde_json::to_string(json_schema).map_err(Error::SchemaSerialization)?;
    let args = structured_args(options, &schema, prompt);
    let output = run_supervised(
        CliTool::ClaudeCode,
        runner,
        options.retry,
        invocation(options, args),
    )
    .await?;
    let envelope = envelope::parse_envelope(CliTool::ClaudeCode, &output.stdout)?;
    if envelope.structured_output.is_none() {
        return Err(Error::MalformedEnvelope {
            tool: CliTool::ClaudeCode,
            reason: "envelope has no `structured_output` field".to_string(),
        });
    }
    Ok(envelope)
}

/// Text call with the default process supervisor.
pub async fn text(prompt: &str, options: &ClaudeCodeOptions) -> Result<TextResponse> {
    let text = text_with(Arc::new(CliExecutor::default()), &options.resolve(), prompt).await?;
    Ok(TextResponse { text })
}

/// Structured call with the default process supervisor.
pub async fn structured(
    prompt: &str,
    json_schema: &Value,
    options: &ClaudeCodeOptions,
) -> Result<ClaudeEnvelope> {
    structured_with(
        Arc::new(CliExecutor::default()),
        &options.resolve(),
        json_schema,
        prompt,
    )
    .await
}
