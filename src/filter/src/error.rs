//! Error types for attribute filtering

use thiserror::Error;

/// Attribute filtering errors
#[derive(Debug, Error)]
pub enum AttributeFilteringError {
    /// A match functor could not be evaluated
    #[error("Filter processing error: {0}")]
    Processing(String),

    /// A policy or one of its rules is misconfigured
    #[error("Invalid filter policy '{id}': {message}")]
    InvalidPolicy { id: String, message: String },

    /// A match functor regular expression failed to compile
    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// Two policies share an id
    #[error("Duplicate filter policy id: {0}")]
    DuplicatePolicy(String),

    /// A new policy group was rejected; the previous one stays active
    #[error("{service} configuration is not valid, retaining old configuration")]
    InvalidConfiguration {
        service: String,
        #[source]
        source: Box<AttributeFilteringError>,
    },
}

impl AttributeFilteringError {
    pub fn invalid_policy(id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AttributeFilteringError::InvalidPolicy {
            id: id.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for filtering operations
pub type Result<T> = std::result::Result<T, AttributeFilteringError>;
