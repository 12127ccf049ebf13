//! JSON Schema generation and validation
//!
//! The CLI layer treats schemas and structured values as opaque JSON. This
//! module is the typed side: it derives a self-contained schema from a Rust
//! type and checks values against a compiled schema.

use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

/// Schema compilation and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The value is valid JSON but does not conform to the schema.
    #[error("Schema validation failed: {}", .errors.join("; "))]
    Violation { errors: Vec<String> },
}

/// JSON Schema for `T` with every subschema inlined.
///
/// Backends receive the schema as a single document, so no `$ref` into a
/// definitions table is emitted.
pub fn json_schema_for<T: JsonSchema>() -> Value {
    SchemaSettings::draft2020_12()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>()
        .to_value()
}

/// Compile a schema document into a reusable validator.
pub fn compile(schema: &Value) -> Result<jsonschema::Validator, SchemaError> {
    jsonschema::validator_for(schema).map_err(|e| SchemaError::InvalidSchema(e.to_string()))
}

/// Validate `value`, collecting every violation with its location.
pub fn validate_value(
    validator: &jsonschema::Validator,
    value: &Value,
) -> Result<(), SchemaError> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("at '{}': {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Violation { errors })
    }
}
