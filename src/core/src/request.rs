//! Request context shared by resolution and filtering

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::EntityDescriptor;

/// Name identifier format used when a subject identifier carries none
pub const UNSPECIFIED_NAME_ID_FORMAT: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// Subject identifier presented by the relying party
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "snake_case")]
pub enum SubjectNameIdentifier {
    /// SAML 1 `NameIdentifier`
    Saml1 {
        value: String,
        format: Option<String>,
        name_qualifier: Option<String>,
    },
    /// SAML 2 `NameID`
    Saml2 {
        value: String,
        format: Option<String>,
        name_qualifier: Option<String>,
        sp_name_qualifier: Option<String>,
    },
}

impl SubjectNameIdentifier {
    pub fn value(&self) -> &str {
        match self {
            SubjectNameIdentifier::Saml1 { value, .. } | SubjectNameIdentifier::Saml2 { value, .. } => value,
        }
    }

    /// Declared format, falling back to the unspecified format when absent or empty
    pub fn format(&self) -> &str {
        let format = match self {
            SubjectNameIdentifier::Saml1 { format, .. } | SubjectNameIdentifier::Saml2 { format, .. } => format,
        };
        format
            .as_deref()
            .filter(|format| !format.trim().is_empty())
            .unwrap_or(UNSPECIFIED_NAME_ID_FORMAT)
    }

    pub fn name_qualifier(&self) -> Option<&str> {
        match self {
            SubjectNameIdentifier::Saml1 { name_qualifier, .. }
            | SubjectNameIdentifier::Saml2 { name_qualifier, .. } => name_qualifier.as_deref(),
        }
    }

    /// SP name qualifier; SAML 1 identifiers have none
    pub fn sp_name_qualifier(&self) -> Option<&str> {
        match self {
            SubjectNameIdentifier::Saml1 { .. } => None,
            SubjectNameIdentifier::Saml2 { sp_name_qualifier, .. } => sp_name_qualifier.as_deref(),
        }
    }
}

/// Everything the engines know about the current attribute request
///
/// `inbound_message_issuer` is the requesting relying party and
/// `outbound_message_issuer` the issuing provider itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeRequestContext {
    pub principal_name: Option<String>,
    pub principal_authentication_method: Option<String>,
    pub inbound_message_issuer: Option<String>,
    pub outbound_message_issuer: Option<String>,
    pub local_entity_id: Option<String>,
    pub subject_name_identifier: Option<SubjectNameIdentifier>,
    /// Attribute ids to resolve; empty means all
    pub requested_attribute_ids: Vec<String>,
    pub peer_entity_metadata: Option<EntityDescriptor>,
    pub local_entity_metadata: Option<EntityDescriptor>,
}

impl AttributeRequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a request context from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal_name = Some(principal.into());
        self
    }

    pub fn with_authentication_method(mut self, method: impl Into<String>) -> Self {
        self.principal_authentication_method = Some(method.into());
        self
    }

    /// Set the requesting relying party
    pub fn with_requester(mut self, entity_id: impl Into<String>) -> Self {
        self.inbound_message_issuer = Some(entity_id.into());
        self
    }

    /// Set the issuing entity; also used as the local entity id
    pub fn with_issuer(mut self, entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into();
        self.local_entity_id = Some(entity_id.clone());
        self.outbound_message_issuer = Some(entity_id);
        self
    }

    pub fn with_subject(mut self, subject: SubjectNameIdentifier) -> Self {
        self.subject_name_identifier = Some(subject);
        self
    }

    pub fn with_requested_attributes<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_attribute_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_peer_metadata(mut self, metadata: EntityDescriptor) -> Self {
        self.peer_entity_metadata = Some(metadata);
        self
    }

    pub fn with_local_metadata(mut self, metadata: EntityDescriptor) -> Self {
        self.local_entity_metadata = Some(metadata);
        self
    }

    /// Requesting relying party
    pub fn requester(&self) -> Option<&str> {
        self.inbound_message_issuer.as_deref()
    }

    /// Issuing entity
    pub fn issuer(&self) -> Option<&str> {
        self.outbound_message_issuer.as_deref()
    }
}
