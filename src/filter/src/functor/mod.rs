//! Match functors
//!
//! A match functor is a predicate evaluated in one of three modes:
//!
//! - policy requirement: decides whether a policy applies at all
//! - permit value: decides whether one value of one attribute is released
//! - deny value: decides whether a retained value is removed again
//!
//! Functors compose through [`And`], [`Or`] and [`Not`].

use regex::{Regex, RegexBuilder};

use attrflow_core::AttributeValue;

use crate::context::FilteringContext;
use crate::error::{AttributeFilteringError, Result};

pub mod basic;
pub mod logic;
pub mod saml;

pub use basic::{AnyMatcher, AttributeScopeMatcher, AttributeValueMatcher, NumberOfAttributeValues, RequestField, RequestMatcher};
pub use logic::{And, Not, Or};
pub use saml::{EntityAttributeMatcher, MetadataTarget};

/// Boolean predicate over a filtering request
pub trait MatchFunctor: Send + Sync {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool>;

    fn evaluate_permit_value(
        &self,
        ctx: &FilteringContext<'_>,
        attribute_id: &str,
        value: &AttributeValue,
    ) -> Result<bool>;

    /// Same as the permit evaluation unless a functor says otherwise
    fn evaluate_deny_rule(
        &self,
        ctx: &FilteringContext<'_>,
        attribute_id: &str,
        value: &AttributeValue,
    ) -> Result<bool> {
        self.evaluate_permit_value(ctx, attribute_id, value)
    }

    /// True when the functor matches every value unconditionally
    fn matches_everything(&self) -> bool {
        false
    }

    /// Check static configuration
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// String comparison used by the basic and metadata functors
#[derive(Debug, Clone)]
pub enum ValueMatcher {
    /// Exact string, optionally ignoring case
    Exact { value: String, case_sensitive: bool },
    /// Regular expression that must match the whole string
    Regex(Regex),
}

impl ValueMatcher {
    pub fn exact(value: impl Into<String>, case_sensitive: bool) -> Self {
        ValueMatcher::Exact {
            value: value.into(),
            case_sensitive,
        }
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        RegexBuilder::new(&format!("^(?:{})$", pattern))
            .build()
            .map(ValueMatcher::Regex)
            .map_err(|e| AttributeFilteringError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            ValueMatcher::Exact { value, case_sensitive: true } => value == candidate,
            ValueMatcher::Exact { value, case_sensitive: false } => value.to_lowercase() == candidate.to_lowercase(),
            ValueMatcher::Regex(regex) => regex.is_match(candidate),
        }
    }
}
