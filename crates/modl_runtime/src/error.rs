//! Error types for field registration and binding

use modl_core::CodecError;
use thiserror::Error;

/// Registry and binding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Instance not tracked: {0}")]
    UnknownInstance(String),

    #[error("No schema registered for prefab: {0}")]
    UnknownSchema(String),

    #[error("No accessor registered for field '{field}' of component '{component}'")]
    UnknownField { component: String, field: String },

    #[error("Instance '{runtime_id}' has no component '{component}'")]
    MissingComponent { runtime_id: String, component: String },

    #[error("Field '{field}' occupies {actual} scalar(s) but its dimension declares {expected}")]
    SizeMismatch { field: String, expected: usize, actual: usize },

    #[error("Component bound to field '{field}' is not a {component}")]
    ComponentTypeMismatch { component: String, field: String },

    #[error("Field '{field}': {source}")]
    Codec {
        field: String,
        #[source]
        source: CodecError,
    },
}

impl RegistryError {
    /// Attach a field id to a codec error
    pub fn codec(field: impl Into<String>, source: CodecError) -> Self {
        RegistryError::Codec {
            field: field.into(),
            source,
        }
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
