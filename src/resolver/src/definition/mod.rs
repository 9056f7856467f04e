//! Attribute definitions
//!
//! Each definition derives exactly one attribute, named after the definition,
//! from the values of its dependencies.

pub mod crypto_transient;
pub mod mapped;
pub mod prescoped;
pub mod regex_split;
pub mod saml2_nameid;
pub mod simple;

pub use crypto_transient::{CryptoTransientIdDefinition, DEFAULT_ID_LIFETIME};
pub use mapped::{MappedAttributeDefinition, SourceValue, ValueMap};
pub use prescoped::PrescopedAttributeDefinition;
pub use regex_split::RegexSplitDefinition;
pub use saml2_nameid::Saml2NameIdDefinition;
pub use simple::SimpleAttributeDefinition;
