//! Envelope parsing
//!
//! Turns what a backend printed (or wrote to its output file) into the
//! canonical text or structured result. Text mode is lenient: anything that
//! is not a JSON object is returned verbatim. Structured mode is strict.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::client::CliTool;
use crate::error::{preview, Error, Result};

/// Characters of offending output quoted in a non-JSON error.
const PREVIEW_CHARS: usize = 200;

/// The JSON object Claude Code prints with `--output-format json`.
///
/// Every field is optional; an absent field stays `None` rather than taking
/// a default that would change its meaning. A field of an unexpected type is
/// treated as absent, so only the fields a call actually needs can fail it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaudeEnvelope {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub permission_denials: Option<Vec<Value>>,
}

impl ClaudeEnvelope {
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

/// Text mode: `result` from a JSON object envelope, or the raw stdout when
/// the tool did not print a JSON object at all.
pub fn parse_text(tool: CliTool, stdout: &str) -> Result<String> {
    let object = match serde_json::from_str::<Value>(stdout) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Ok(stdout.to_string()),
    };

    let envelope = decode_envelope(tool, object)?;
    if envelope.is_error() {
        return Err(error_envelope(tool, envelope));
    }
    envelope.result.ok_or_else(|| Error::MalformedEnvelope {
        tool,
        reason: "envelope has no string `result` field".to_string(),
    })
}

/// Structured mode, strict: stdout must be a JSON object envelope that is
/// not an error envelope. Returns the whole envelope.
pub fn parse_envelope(tool: CliTool, stdout: &str) -> Result<ClaudeEnvelope> {
    let object = parse_object(tool, stdout)?;
    let envelope = decode_envelope(tool, object)?;
    if envelope.is_error() {
        return Err(error_envelope(tool, envelope));
    }
    if let Some(cost) = envelope.total_cost_usd {
        tracing::debug!(tool = %tool, total_cost_usd = cost, "Envelope reported cost");
    }
    Ok(envelope)
}

/// Structured mode, strict: the `structured_output` of a success envelope.
pub fn parse_structured(tool: CliTool, stdout: &str) -> Result<Value> {
    let envelope = parse_envelope(tool, stdout)?;
    take_structured(tool, envelope)
}

/// Extract `structured_output`, which must be present.
pub fn take_structured(tool: CliTool, envelope: ClaudeEnvelope) -> Result<Value> {
    envelope
        .structured_output
        .ok_or_else(|| Error::MalformedEnvelope {
            tool,
            reason: "envelope has no `structured_output` field".to_string(),
        })
}

/// Structured mode for file-based backends: the file's contents are the
/// structured value itself and must be a JSON object.
pub fn parse_output_file(tool: CliTool, raw: &str) -> Result<Value> {
    parse_object(tool, raw)
}

fn parse_object(tool: CliTool, text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).map_err(|_| Error::NonJsonOutput {
        tool,
        preview: preview(text, PREVIEW_CHARS),
    })?;
    if !value.is_object() {
        return Err(Error::NonObjectEnvelope { tool });
    }
    Ok(value)
}

fn decode_envelope(tool: CliTool, object: Value) -> Result<ClaudeEnvelope> {
    serde_json::from_value(object).map_err(|e| Error::MalformedEnvelope {
        tool,
        reason: e.to_string(),
    })
}

/// `Some` when the value has the expected type, `None` otherwise.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn error_envelope(tool: CliTool, envelope: ClaudeEnvelope) -> Error {
    Error::BackendErrorEnvelope {
        tool,
        subtype: envelope.subtype.unwrap_or_else(|| "unknown".to_string()),
    }
}
