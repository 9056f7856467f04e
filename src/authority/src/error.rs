//! Error types for the attribute authority

use thiserror::Error;

use attrflow_filter::AttributeFilteringError;
use attrflow_resolver::ResolutionError;

/// Attribute authority errors
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("Attribute resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Attribute filtering failed: {0}")]
    Filtering(#[from] AttributeFilteringError),
}

/// Result type for authority operations
pub type Result<T> = std::result::Result<T, AuthorityError>;
