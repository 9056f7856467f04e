//! # Attrflow Attribute Filtering
//!
//! Release policy for resolved attributes. A policy group is evaluated
//! against each request: policies whose requirement holds permit values per
//! attribute and register deny rules, and deny rules always win. Anything not
//! explicitly permitted is withheld.

pub mod context;
pub mod engine;
pub mod error;
pub mod functor;
pub mod policy;

// Re-export commonly used types
pub use context::FilteringContext;
pub use engine::AttributeFilteringEngine;
pub use error::{AttributeFilteringError, Result};
pub use functor::{
    And, AnyMatcher, AttributeScopeMatcher, AttributeValueMatcher, EntityAttributeMatcher, MatchFunctor,
    MetadataTarget, Not, NumberOfAttributeValues, Or, RequestField, RequestMatcher, ValueMatcher,
};
pub use policy::{AttributeFilterPolicy, AttributeRule};
