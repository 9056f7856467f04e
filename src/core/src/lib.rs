//! # Attrflow Core
//!
//! Attribute model and request context shared by the resolver, the
//! filtering engine and the authority facade.

pub mod attribute;
pub mod error;
pub mod metadata;
pub mod request;

pub use attribute::{
    Attribute, AttributeMap, AttributeValue, FloatValue, NameIdentifierValue, ScopedValue,
    ValueComparator,
};
pub use error::{CoreError, Result};
pub use metadata::{EntityAttribute, EntityAttributeValue, EntityAttributes, EntityDescriptor};
pub use request::{AttributeRequestContext, SubjectNameIdentifier, UNSPECIFIED_NAME_ID_FORMAT};
