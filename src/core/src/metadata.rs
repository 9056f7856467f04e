//! Entity metadata consulted by the filtering engine
//!
//! Only the parts of SAML metadata the release rules look at are modeled:
//! the entity id and the `EntityAttributes` extensions.

use serde::{Deserialize, Serialize};

/// Metadata for a peer or local entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub entity_id: String,

    /// `EntityAttributes` extensions in document order
    #[serde(default)]
    pub extensions: Vec<EntityAttributes>,
}

impl EntityDescriptor {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            extensions: Vec::new(),
        }
    }

    /// Append an `EntityAttributes` extension
    pub fn with_entity_attributes(mut self, attributes: Vec<EntityAttribute>) -> Self {
        self.extensions.push(EntityAttributes { attributes });
        self
    }

    /// The extension consulted by entity-attribute rules (the first one)
    pub fn entity_attributes(&self) -> Option<&EntityAttributes> {
        self.extensions.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    pub attributes: Vec<EntityAttribute>,
}

/// A named attribute asserted about an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttribute {
    pub name: String,
    pub name_format: Option<String>,
    #[serde(default)]
    pub values: Vec<EntityAttributeValue>,
}

impl EntityAttribute {
    pub fn new(name: impl Into<String>, values: Vec<EntityAttributeValue>) -> Self {
        Self {
            name: name.into(),
            name_format: None,
            values,
        }
    }

    pub fn with_name_format(mut self, name_format: impl Into<String>) -> Self {
        self.name_format = Some(name_format.into());
        self
    }
}

/// Typed value of an entity attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityAttributeValue {
    /// Untyped XML element; compared on its text content
    Any { text_content: Option<String> },
    /// `xs:string` typed value
    String { value: Option<String> },
    /// Any other schema type; never matched
    Other { type_name: String },
}

impl EntityAttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        EntityAttributeValue::String {
            value: Some(value.into()),
        }
    }

    pub fn any(text_content: impl Into<String>) -> Self {
        EntityAttributeValue::Any {
            text_content: Some(text_content.into()),
        }
    }

    /// Comparable text, if this value type carries any
    pub fn text(&self) -> Option<&str> {
        match self {
            EntityAttributeValue::Any { text_content } => text_content.as_deref(),
            EntityAttributeValue::String { value } => value.as_deref(),
            EntityAttributeValue::Other { .. } => None,
        }
    }
}
