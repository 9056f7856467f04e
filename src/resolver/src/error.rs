//! Error types for attribute resolution

use std::fmt;
use thiserror::Error;

/// Which part of a transient identifier failed to match the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    NameQualifier,
    SpNameQualifier,
    Issuer,
    Requester,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MismatchKind::NameQualifier => "name qualifier",
            MismatchKind::SpNameQualifier => "SP name qualifier",
            MismatchKind::Issuer => "issuer",
            MismatchKind::Requester => "requester",
        };
        f.write_str(label)
    }
}

/// Attribute resolution errors
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A data connector could not produce its attributes
    #[error("Data connector '{id}' failed: {message}")]
    DataConnector { id: String, message: String },

    /// An attribute definition could not derive its attribute
    #[error("Attribute definition '{id}' failed: {message}")]
    AttributeDefinition { id: String, message: String },

    /// A principal connector could not map the subject
    #[error("Principal connector '{id}' failed: {message}")]
    PrincipalConnector { id: String, message: String },

    /// Static plugin configuration is invalid
    #[error("Invalid configuration for '{id}': {message}")]
    InvalidConfiguration { id: String, message: String },

    /// Plugin ids form a dependency cycle
    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    /// Two plugins registered under the same id
    #[error("Duplicate plugin id: {0}")]
    DuplicatePlugin(String),

    /// A failover or principal dependency names a connector that does not exist
    #[error("Unknown data connector: {0}")]
    UnknownDataConnector(String),

    /// No principal connector accepts the subject format for this requester
    #[error("No principal connector for format '{format}' and relying party '{relying_party}'")]
    NoPrincipalConnector { format: String, relying_party: String },

    /// The request lacks data a plugin needs
    #[error("Request is missing {0}")]
    MissingRequestData(&'static str),

    /// A query returned nothing and the connector treats that as an error
    #[error("No results returned by '{0}'")]
    NoResult(String),

    /// A sealed transient identifier is past its lifetime
    #[error("Principal identifier has expired")]
    ExpiredIdentifier,

    /// A transient identifier was issued for another party
    #[error("Transient identifier {kind} mismatch: token carries '{decoded}', request has '{expected}'")]
    TransientIdMismatch {
        kind: MismatchKind,
        decoded: String,
        expected: String,
    },

    /// A transient identifier did not decode into issuer, requester and principal
    #[error("Invalid transient identifier: {0}")]
    InvalidToken(String),

    /// Sealing or unsealing failed for a reason other than expiry
    #[error("Sealing error: {0}")]
    Sealing(String),

    /// Statement template could not be rendered
    #[error("Template error: {0}")]
    Template(String),

    /// Directory (LDAP) error
    #[error("Directory error: {0}")]
    Directory(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolutionError {
    pub fn connector(id: impl Into<String>, message: impl fmt::Display) -> Self {
        ResolutionError::DataConnector {
            id: id.into(),
            message: message.to_string(),
        }
    }

    pub fn definition(id: impl Into<String>, message: impl fmt::Display) -> Self {
        ResolutionError::AttributeDefinition {
            id: id.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_config(id: impl Into<String>, message: impl fmt::Display) -> Self {
        ResolutionError::InvalidConfiguration {
            id: id.into(),
            message: message.to_string(),
        }
    }
}

impl From<attrflow_core::CoreError> for ResolutionError {
    fn from(err: attrflow_core::CoreError) -> Self {
        ResolutionError::Internal(err.to_string())
    }
}

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, ResolutionError>;

/// Errors raised by the resolver service itself
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A new plugin configuration was rejected; the previous one stays active
    #[error("{service} configuration is not valid, retaining old configuration")]
    InvalidConfiguration {
        service: String,
        #[source]
        source: ResolutionError,
    },
}
