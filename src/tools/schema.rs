//! Argument validation against a tool's input schema.
//!
//! Only the subset of JSON Schema the tool catalog uses is understood:
//! `properties` with `type` (`string`, `integer`, `number`, `boolean`,
//! `object`, `array`) and `enum`, plus `required` and
//! `additionalProperties: false`. Required string arguments must not be
//! blank.

use serde_json::{Map, Value};
use thiserror::Error;

/// A tool argument that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// Arguments were not a JSON object.
    #[error("arguments must be a JSON object")]
    NotAnObject,

    /// A required argument is absent.
    #[error("missing required argument '{name}'")]
    Missing {
        /// Argument name.
        name: String,
    },

    /// A required string argument is empty or whitespace.
    #[error("argument '{name}' must not be empty")]
    Blank {
        /// Argument name.
        name: String,
    },

    /// An argument has the wrong JSON type.
    #[error("argument '{name}' must be of type {expected}")]
    WrongType {
        /// Argument name.
        name: String,
        /// The declared type.
        expected: String,
    },

    /// An argument is outside its declared `enum`.
    #[error("argument '{name}' must be one of: {allowed}")]
    NotAllowed {
        /// Argument name.
        name: String,
        /// Comma-separated allowed values.
        allowed: String,
    },

    /// An argument the schema does not declare.
    #[error("unknown argument '{name}'")]
    Unknown {
        /// Argument name.
        name: String,
    },
}

/// Validates `arguments` against `schema`, returning the argument object.
///
/// # Errors
///
/// Returns the first violation, checking required arguments before
/// per-argument types.
pub fn validate(schema: &Value, arguments: &Value) -> Result<Map<String, Value>, ArgumentError> {
    let args = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        _ => return Err(ArgumentError::NotAnObject),
    };

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);

    for name in required {
        match args.get(name) {
            None | Some(Value::Null) => {
                return Err(ArgumentError::Missing {
                    name: name.to_string(),
                })
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(ArgumentError::Blank {
                    name: name.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in &args {
        let Some(property) = properties.get(name) else {
            if closed {
                return Err(ArgumentError::Unknown { name: name.clone() });
            }
            continue;
        };

        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !matches_type(value, expected) {
                return Err(ArgumentError::WrongType {
                    name: name.clone(),
                    expected: expected.to_string(),
                });
            }
        }

        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let allowed = allowed
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ArgumentError::NotAllowed {
                    name: name.clone(),
                    allowed,
                });
            }
        }
    }

    Ok(args)
}

/// Returns `true` if `value` has JSON Schema type `expected`.
///
/// Unknown type names are accepted.
fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
