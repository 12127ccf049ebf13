//! Typed structured tasks
//!
//! A [`TypedTask`] ties an input type, a prompt template and an output type
//! to a [`CliClient`]: input is validated, rendered into a prompt, sent as a
//! structured call with the output type's schema, and the reply is validated
//! and decoded before it reaches the caller.

use std::marker::PhantomData;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cli_executor::ClaudeCodeOptions;
use crate::client::{CliClient, GenerateStructuredArgs, ToolClient};
use crate::schema::{self, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Invalid task input: {0}")]
    InvalidInput(String),

    #[error("Model returned invalid structured output:\n{0}")]
    InvalidOutput(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Client(#[from] crate::error::Error),
}

type PromptFn<I> = Box<dyn Fn(&I) -> String + Send + Sync>;

pub struct TypedTask<I, O> {
    client: Arc<dyn CliClient>,
    prompt: PromptFn<I>,
    input_validator: jsonschema::Validator,
    output_schema: Value,
    output_validator: jsonschema::Validator,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> TypedTask<I, O>
where
    I: Serialize + DeserializeOwned + JsonSchema,
    O: DeserializeOwned + JsonSchema,
{
    pub fn new<F>(client: Arc<dyn CliClient>, prompt: F) -> Result<Self, TaskError>
    where
        F: Fn(&I) -> String + Send + Sync + 'static,
    {
        let input_validator = schema::compile(&schema::json_schema_for::<I>())?;
        let output_schema = schema::json_schema_for::<O>();
        let output_validator = schema::compile(&output_schema)?;
        Ok(Self {
            client,
            prompt: Box::new(prompt),
            input_validator,
            output_schema,
            output_validator,
            _types: PhantomData,
        })
    }

    /// Task over a Claude Code client with default options.
    pub fn claude_code<F>(prompt: F) -> Result<Self, TaskError>
    where
        F: Fn(&I) -> String + Send + Sync + 'static,
    {
        Self::new(
            Arc::new(ToolClient::claude_code(ClaudeCodeOptions::default())),
            prompt,
        )
    }

    /// Schema sent to the backend for every call.
    pub fn output_schema(&self) -> &Value {
        &self.output_schema
    }

    /// Run with an untyped input that is validated before use.
    pub async fn run_json(&self, input: Value) -> Result<O, TaskError> {
        schema::validate_value(&self.input_validator, &input)
            .map_err(|e| TaskError::InvalidInput(e.to_string()))?;
        let input: I =
            serde_json::from_value(input).map_err(|e| TaskError::InvalidInput(e.to_string()))?;
        self.call(&input).await
    }

    /// Run with a typed input; it is still checked against its own schema.
    pub async fn run(&self, input: &I) -> Result<O, TaskError> {
        let value =
            serde_json::to_value(input).map_err(|e| TaskError::InvalidInput(e.to_string()))?;
        schema::validate_value(&self.input_validator, &value)
            .map_err(|e| TaskError::InvalidInput(e.to_string()))?;
        self.call(input).await
    }

    async fn call(&self, input: &I) -> Result<O, TaskError> {
        let prompt = (self.prompt)(input);
        let response = self
            .client
            .structured_value(GenerateStructuredArgs::new(
                prompt,
                self.output_schema.clone(),
            ))
            .await?;

        schema::validate_value(&self.output_validator, &response.structured)
            .map_err(|e| TaskError::InvalidOutput(e.to_string()))?;
        serde_json::from_value(response.structured)
            .map_err(|e| TaskError::InvalidOutput(e.to_string()))
    }
}
