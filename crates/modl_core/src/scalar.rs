//! Wire scalar values
//!
//! A closed replacement for `google.protobuf.Value`: every element of an
//! object, action or sensor buffer is one of these variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single element of a flattened buffer.
///
/// Serialized untagged, so the JSON form is the bare value
/// (`1.5`, `"text"`, `true`, `[1.0, 2.0]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Numeric value
    Number(f64),
    /// String value (typed format only)
    Text(String),
    /// Boolean value
    Boolean(bool),
    /// Packed list of floats (typed format only)
    List(Vec<f64>),
}

impl Scalar {
    /// Numeric view of the scalar, if it has one.
    ///
    /// Booleans map to 1.0/0.0 so that Brains that answer with JSON
    /// booleans still drive numeric fields.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Text view of the scalar
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// List view of the scalar
    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            Scalar::List(values) => Some(values),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Number(_) => "number",
            Scalar::Text(_) => "text",
            Scalar::Boolean(_) => "boolean",
            Scalar::List(_) => "list",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::List(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "List[{}]", joined.join(","))
            }
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}
