//! Error types shared by the attribute model

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building or converting attribute values
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    /// A scoped value did not contain exactly one scope delimiter
    #[error("Value '{value}' is not scoped by exactly one '{delimiter}'")]
    InvalidScopedValue { value: String, delimiter: String },

    /// A value could not be converted to the requested type
    #[error("Invalid {kind} value: {value}")]
    InvalidValue { kind: &'static str, value: String },

    /// Serialization/Deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
