//! # Attrflow Attribute Authority
//!
//! Resolves a principal's attributes and applies release policy in one call,
//! and maps subject identifiers back to principal names.

pub mod authority;
pub mod error;

pub use authority::AttributeAuthority;
pub use error::{AuthorityError, Result};
