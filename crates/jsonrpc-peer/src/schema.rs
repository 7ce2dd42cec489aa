use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Mismatch between a JSON value and the schema registered for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, got {got}")]
pub struct SchemaError {
    pub expected: String,
    pub got: String,
}

impl SchemaError {
    fn new(expected: impl Into<String>, value: &Value) -> Self {
        Self {
            expected: expected.into(),
            got: json_kind(value).to_string(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Structural descriptor for a method's `params` or `result` value.
///
/// Schemas are checked at construction time for outgoing messages and at
/// dispatch time for incoming ones. `None` means the value must be absent
/// (encoded as JSON null here, since absent fields decode to null); `Any`
/// places no constraint at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    /// The value must be absent.
    None,
    /// Any value, including absent.
    Any,
    Null,
    Bool,
    /// Any JSON number.
    Number,
    /// A JSON number with no fractional part.
    Integer,
    String,
    /// An array whose every element satisfies the inner schema.
    Array(Box<Schema>),
    /// Any JSON object.
    Object,
    /// At least one of the alternatives must accept the value.
    OneOf(Vec<Schema>),
}

impl Schema {
    /// Shorthand for `Schema::Array`.
    pub fn list(inner: Schema) -> Self {
        Schema::Array(Box::new(inner))
    }

    /// Shorthand for `Schema::OneOf`.
    pub fn one_of(alternatives: impl IntoIterator<Item = Schema>) -> Self {
        Schema::OneOf(alternatives.into_iter().collect())
    }

    /// Check `value` against this schema.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        match self {
            Schema::Any => Ok(()),
            Schema::None => match value {
                Value::Null => Ok(()),
                other => Err(SchemaError::new("no value", other)),
            },
            Schema::Null => match value {
                Value::Null => Ok(()),
                other => Err(SchemaError::new("null", other)),
            },
            Schema::Bool => match value {
                Value::Bool(_) => Ok(()),
                other => Err(SchemaError::new("a boolean", other)),
            },
            Schema::Number => match value {
                Value::Number(_) => Ok(()),
                other => Err(SchemaError::new("a number", other)),
            },
            Schema::Integer => {
                if value.as_i64().is_some() || value.as_u64().is_some() {
                    Ok(())
                } else {
                    Err(SchemaError::new("an integer", value))
                }
            }
            Schema::String => match value {
                Value::String(_) => Ok(()),
                other => Err(SchemaError::new("a string", other)),
            },
            Schema::Object => match value {
                Value::Object(_) => Ok(()),
                other => Err(SchemaError::new("an object", other)),
            },
            Schema::Array(inner) => match value {
                Value::Array(items) => {
                    for item in items {
                        inner.validate(item).map_err(|e| SchemaError {
                            expected: format!("{} as array element", e.expected),
                            got: e.got,
                        })?;
                    }
                    Ok(())
                }
                other => Err(SchemaError::new(self.to_string(), other)),
            },
            Schema::OneOf(alternatives) => {
                if alternatives.iter().any(|s| s.validate(value).is_ok()) {
                    Ok(())
                } else {
                    Err(SchemaError::new(self.to_string(), value))
                }
            }
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::None => write!(f, "no value"),
            Schema::Any => write!(f, "any value"),
            Schema::Null => write!(f, "null"),
            Schema::Bool => write!(f, "a boolean"),
            Schema::Number => write!(f, "a number"),
            Schema::Integer => write!(f, "an integer"),
            Schema::String => write!(f, "a string"),
            Schema::Object => write!(f, "an object"),
            Schema::Array(inner) => write!(f, "an array of {}", inner),
            Schema::OneOf(alternatives) => {
                write!(f, "one of [")?;
                for (i, schema) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", schema)?;
                }
                write!(f, "]")
            }
        }
    }
}
