//! Backend-agnostic client for AI command-line tools
//!
//! A [`ToolClient`] binds one backend, its resolved options and a process
//! runner at construction. Every call rebuilds its own invocation from those,
//! so one client can serve many concurrent calls.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli_executor::adapters::{claude_code, codex};
use crate::cli_executor::{
    ClaudeCodeOptions, CliExecutor, CodexOptions, Invocation, ProcessRunner,
    ResolvedClaudeCodeOptions, ResolvedCodexOptions,
};
use crate::config::EnvelopeConfig;
use crate::error::{Error, Result};

/// Which CLI backend a client drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliTool {
    ClaudeCode,
    Codex,
}

impl CliTool {
    /// Tag used in configuration and as the provider id.
    pub fn as_str(&self) -> &'static str {
        match self {
            CliTool::ClaudeCode => "claude-code",
            CliTool::Codex => "codex",
        }
    }

    /// Short name used in error messages.
    pub fn cli_name(&self) -> &'static str {
        match self {
            CliTool::ClaudeCode => "claude",
            CliTool::Codex => "codex",
        }
    }
}

impl fmt::Display for CliTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CliTool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "claude-code" | "claude" => Ok(CliTool::ClaudeCode),
            "codex" => Ok(CliTool::Codex),
            other => Err(format!(
                "unknown CLI tool '{}', expected 'claude-code' or 'codex'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTextArgs {
    pub prompt: String,
}

impl GenerateTextArgs {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateStructuredArgs {
    pub prompt: String,
    /// JSON Schema document the output must follow.
    pub json_schema: Value,
}

impl GenerateStructuredArgs {
    pub fn new(prompt: impl Into<String>, json_schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            json_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse<T> {
    pub structured: T,
}

/// Uniform text/structured interface over the supported backends.
#[async_trait]
pub trait CliClient: Send + Sync {
    fn tool(&self) -> CliTool;

    fn model(&self) -> &str;

    async fn text(&self, args: GenerateTextArgs) -> Result<TextResponse>;

    /// Structured call returning the raw JSON value.
    async fn structured_value(
        &self,
        args: GenerateStructuredArgs,
    ) -> Result<StructuredResponse<Value>>;
}

/// Typed structured calls for any [`CliClient`].
#[async_trait]
pub trait CliClientExt: CliClient {
    /// Structured call decoded into `T`. Decoding is not schema validation;
    /// see [`crate::task::TypedTask`] for that.
    async fn structured<T>(&self, args: GenerateStructuredArgs) -> Result<StructuredResponse<T>>
    where
        T: DeserializeOwned + Send,
    {
        let response = self.structured_value(args).await?;
        let structured =
            serde_json::from_value(response.structured).map_err(Error::StructuredDecode)?;
        Ok(StructuredResponse { structured })
    }
}

impl<C: CliClient + ?Sized> CliClientExt for C {}

/// Backend selected at construction, with its fully-resolved options.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    ClaudeCode(ResolvedClaudeCodeOptions),
    Codex(ResolvedCodexOptions),
}

impl Backend {
    pub fn tool(&self) -> CliTool {
        match self {
            Backend::ClaudeCode(_) => CliTool::ClaudeCode,
            Backend::Codex(_) => CliTool::Codex,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Backend::ClaudeCode(options) => &options.model,
            Backend::Codex(options) => &options.model,
        }
    }

    fn version_invocation(&self) -> Invocation {
        let args = vec!["--version".to_string()];
        match self {
            Backend::ClaudeCode(options) => claude_code::invocation(options, args),
            Backend::Codex(options) => codex::invocation(options, args),
        }
    }
}

/// [`CliClient`] over one configured backend.
#[derive(Clone)]
pub struct ToolClient {
    backend: Backend,
    runner: Arc<dyn ProcessRunner>,
}

impl ToolClient {
    /// Client over the given backend using the real process supervisor.
    pub fn new(backend: Backend) -> Self {
        Self::with_runner(backend, Arc::new(CliExecutor::default()))
    }

    pub fn with_runner(backend: Backend, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { backend, runner }
    }

    pub fn claude_code(options: ClaudeCodeOptions) -> Self {
        Self::new(Backend::ClaudeCode(options.resolve()))
    }

    pub fn codex(options: CodexOptions) -> Self {
        Self::new(Backend::Codex(options.resolve()))
    }

    /// Client for `tool` using the options from `config`.
    pub fn from_config(tool: CliTool, config: &EnvelopeConfig) -> Self {
        match tool {
            CliTool::ClaudeCode => Self::claude_code(config.claude_code.clone()),
            CliTool::Codex => Self::codex(config.codex.clone()),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Run `<executable> --version` and return its trimmed output.
    pub async fn health_check(&self) -> Result<String> {
        let tool = self.backend.tool();
        let invocation = self.backend.version_invocation();
        tracing::debug!(tool = %tool, executable = %invocation.executable, "Health check");

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|source| Error::Process { tool, source })?;
        Ok(output.stdout.trim().to_string())
    }
}

impl fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolClient")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CliClient for ToolClient {
    fn tool(&self) -> CliTool {
        self.backend.tool()
    }

    fn model(&self) -> &str {
        self.backend.model()
    }

    async fn text(&self, args: GenerateTextArgs) -> Result<TextResponse> {
        let runner = self.runner.clone();
        let text = match &self.backend {
            Backend::ClaudeCode(options) => {
                claude_code::text_with(runner, options, &args.prompt).await?
            }
            Backend::Codex(options) => codex::text_with(runner, options, &args.prompt).await?,
        };
        Ok(TextResponse { text })
    }

    async fn structured_value(
        &self,
        args: GenerateStructuredArgs,
    ) -> Result<StructuredResponse<Value>> {
        let runner = self.runner.clone();
        let structured = match &self.backend {
            Backend::ClaudeCode(options) => {
                let envelope =
                    claude_code::structured_with(runner, options, &args.json_schema, &args.prompt)
                        .await?;
                crate::cli_executor::envelope::take_structured(CliTool::ClaudeCode, envelope)?
            }
            Backend::Codex(options) => {
                codex::structured_with(runner, options, &args.json_schema, &args.prompt)
                    .await?
                    .structured
            }
        };
        Ok(StructuredResponse { structured })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli_executor::MockProcessRunner;
    use serde_json::json;

    fn claude_with(mock: &MockProcessRunner) -> ToolClient {
        ToolClient::with_runner(
            Backend::ClaudeCode(ClaudeCodeOptions::default().resolve()),
            Arc::new(mock.clone()),
        )
    }

    #[test]
    fn test_tool_tags() {
        assert_eq!(CliTool::ClaudeCode.to_string(), "claude-code");
        assert_eq!(CliTool::Codex.cli_name(), "codex");
        assert_eq!("codex".parse::<CliTool>().unwrap(), CliTool::Codex);
        assert_eq!("claude".parse::<CliTool>().unwrap(), CliTool::ClaudeCode);
        assert!("gemini".parse::<CliTool>().is_err());
        assert_eq!(
            serde_json::to_string(&CliTool::ClaudeCode).unwrap(),
            "\"claude-code\""
        );
    }

    #[test]
    fn test_client_binds_model() {
        let client = ToolClient::claude_code(ClaudeCodeOptions {
            model: Some("sonnet".into()),
            ..Default::default()
        });
        assert_eq!(client.tool(), CliTool::ClaudeCode);
        assert_eq!(client.model(), "sonnet");

        let client = ToolClient::codex(CodexOptions::default());
        assert_eq!(client.model(), "gpt-5.3-codex");
    }

    #[tokio::test]
    async fn test_text_call() {
        let mock = MockProcessRunner::with_stdout(r#"{"result":"hello world"}"#);
        let client = claude_with(&mock);
        let response = client.text(GenerateTextArgs::new("hi")).await.unwrap();
        assert_eq!(response.text, "hello world");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        answer: u32,
    }

    #[tokio::test]
    async fn test_typed_structured_call() {
        let mock = MockProcessRunner::with_stdout(
            r#"{"result":"done","structured_output":{"answer":42}}"#,
        );
        let client = claude_with(&mock);
        let response: StructuredResponse<Answer> = client
            .structured(GenerateStructuredArgs::new("q", json!({"type":"object"})))
            .await
            .unwrap();
        assert_eq!(response.structured, Answer { answer: 42 });
    }

    #[tokio::test]
    async fn test_typed_decode_failure() {
        let mock = MockProcessRunner::with_stdout(
            r#"{"structured_output":{"answer":"forty-two"}}"#,
        );
        let client = claude_with(&mock);
        let err = client
            .structured::<Answer>(GenerateStructuredArgs::new("q", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StructuredDecode(_)));
    }

    #[tokio::test]
    async fn test_health_check_passes_version_flag() {
        let mock = MockProcessRunner::with_stdout("2.1.0 (Claude Code)\n");
        let client = claude_with(&mock);
        assert_eq!(client.health_check().await.unwrap(), "2.1.0 (Claude Code)");
        assert_eq!(mock.last_invocation().unwrap().args, vec!["--version"]);
    }

    #[tokio::test]
    async fn test_client_usable_as_trait_object() {
        let mock = MockProcessRunner::with_stdout("plain text response");
        let client: Arc<dyn CliClient> = Arc::new(claude_with(&mock));
        let response = client.text(GenerateTextArgs::new("hi")).await.unwrap();
        assert_eq!(response.text, "plain text response");
    }
}
