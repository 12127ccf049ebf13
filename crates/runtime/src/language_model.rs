//! Generative-model adapter over a [`CliClient`]
//!
//! Presents a CLI backend through a chat-style model interface. Message
//! arrays are flattened into one transcript string, object-json calls become
//! structured calls, and streaming is one complete call replayed as a single
//! text chunk plus a finish event.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cli_executor::{ClaudeCodeOptions, CodexOptions};
use crate::client::{CliClient, CliTool, GenerateStructuredArgs, GenerateTextArgs, ToolClient};
use crate::config::EnvelopeConfig;
use crate::error::{Error, Result};

pub const SPECIFICATION_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
    Tool,
}

impl PromptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptRole::System => "system",
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
            PromptRole::Tool => "tool",
        }
    }
}

/// One part of a message. Only `Text` survives flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        image: String,
        #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    File {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        args: Value,
    },
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        result: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: Vec<ContentPart>,
}

impl PromptMessage {
    pub fn text(role: PromptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(PromptRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(PromptRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(PromptRole::Assistant, text)
    }
}

/// How the caller wants the output shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallMode {
    Regular,
    ObjectJson {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    pub prompt: Vec<PromptMessage>,
    pub mode: CallMode,
}

impl CallOptions {
    pub fn regular(prompt: Vec<PromptMessage>) -> Self {
        Self {
            prompt,
            mode: CallMode::Regular,
        }
    }

    pub fn object_json(prompt: Vec<PromptMessage>, schema: Value) -> Self {
        Self {
            prompt,
            mode: CallMode::ObjectJson {
                schema: Some(schema),
                name: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectGenerationMode {
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
}

/// Token usage. The CLIs do not report tokens, so this is always zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// What was actually sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCall {
    pub raw_prompt: String,
    pub raw_settings: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub raw_call: RawCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    TextDelta {
        text_delta: String,
    },
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
    },
}

pub struct StreamResult {
    pub stream: BoxStream<'static, StreamPart>,
    pub raw_call: RawCall,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn specification_version(&self) -> &'static str {
        SPECIFICATION_VERSION
    }

    fn provider(&self) -> &str;

    fn model_id(&self) -> &str;

    fn default_object_generation_mode(&self) -> ObjectGenerationMode;

    fn supports_structured_outputs(&self) -> bool;

    async fn do_generate(&self, options: CallOptions) -> Result<GenerateResult>;

    async fn do_stream(&self, options: CallOptions) -> Result<StreamResult>;
}

/// [`LanguageModel`] backed by a CLI client.
#[derive(Clone)]
pub struct CliLanguageModel {
    client: Arc<dyn CliClient>,
    model_id: String,
}

impl CliLanguageModel {
    pub fn new(client: Arc<dyn CliClient>) -> Self {
        let model_id = client.model().to_string();
        Self { client, model_id }
    }
}

/// Model for `tool` with the options from `config` and `model` as its id.
pub fn cli_model(
    tool: CliTool,
    model: impl Into<String>,
    config: &EnvelopeConfig,
) -> CliLanguageModel {
    match tool {
        CliTool::ClaudeCode => claude_code(model, config.claude_code.clone()),
        CliTool::Codex => codex(model, config.codex.clone()),
    }
}

pub fn claude_code(model: impl Into<String>, mut options: ClaudeCodeOptions) -> CliLanguageModel {
    options.model = Some(model.into());
    CliLanguageModel::new(Arc::new(ToolClient::claude_code(options)))
}

pub fn codex(model: impl Into<String>, mut options: CodexOptions) -> CliLanguageModel {
    options.model = Some(model.into());
    CliLanguageModel::new(Arc::new(ToolClient::codex(options)))
}

/// Flatten messages into `role: text` lines. Non-text parts are dropped and
/// messages without any text are skipped.
pub fn flatten_prompt(messages: &[PromptMessage]) -> String {
    messages
        .iter()
        .filter_map(|message| {
            let text: String = message
                .content
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(format!("{}: {}", message.role.as_str(), text))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LanguageModel for CliLanguageModel {
    fn provider(&self) -> &str {
        self.client.tool().as_str()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn default_object_generation_mode(&self) -> ObjectGenerationMode {
        ObjectGenerationMode::Json
    }

    fn supports_structured_outputs(&self) -> bool {
        true
    }

    async fn do_generate(&self, options: CallOptions) -> Result<GenerateResult> {
        let prompt = flatten_prompt(&options.prompt);
        let raw_call = RawCall {
            raw_prompt: prompt.clone(),
            raw_settings: json!({ "mode": options.mode }),
        };

        let text = match options.mode {
            CallMode::ObjectJson { schema, .. } => {
                let schema = schema.ok_or(Error::MissingSchema)?;
                let response = self
                    .client
                    .structured_value(GenerateStructuredArgs::new(prompt, schema))
                    .await?;
                serde_json::to_string(&response.structured).map_err(Error::StructuredEncode)?
            }
            CallMode::Regular => {
                self.client
                    .text(GenerateTextArgs::new(prompt))
                    .await?
                    .text
            }
        };

        Ok(GenerateResult {
            text,
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            raw_call,
        })
    }

    async fn do_stream(&self, options: CallOptions) -> Result<StreamResult> {
        let result = self.do_generate(options).await?;

        let mut parts = Vec::with_capacity(2);
        if !result.text.is_empty() {
            parts.push(StreamPart::TextDelta {
                text_delta: result.text,
            });
        }
        parts.push(StreamPart::Finish {
            finish_reason: result.finish_reason,
            usage: result.usage,
        });

        Ok(StreamResult {
            stream: stream::iter(parts).boxed(),
            raw_call: result.raw_call,
            warnings: Vec::new(),
        })
    }
}
