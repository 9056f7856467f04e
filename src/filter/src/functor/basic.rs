//! Request and attribute value functors

use attrflow_core::AttributeValue;

use super::{MatchFunctor, ValueMatcher};
use crate::context::FilteringContext;
use crate::error::{AttributeFilteringError, Result};

/// Matches everything in every mode
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatcher;

impl MatchFunctor for AnyMatcher {
    fn evaluate_policy_requirement(&self, _ctx: &FilteringContext<'_>) -> Result<bool> {
        Ok(true)
    }

    fn evaluate_permit_value(&self, _ctx: &FilteringContext<'_>, _: &str, _: &AttributeValue) -> Result<bool> {
        Ok(true)
    }

    fn matches_everything(&self) -> bool {
        true
    }
}

/// Request property compared by a [`RequestMatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField {
    /// Requesting relying party
    Requester,
    /// Issuing (local) entity
    Issuer,
    PrincipalName,
    AuthenticationMethod,
}

/// Matches a request property; the same outcome for every value
///
/// An absent property never matches.
#[derive(Debug, Clone)]
pub struct RequestMatcher {
    field: RequestField,
    matcher: ValueMatcher,
}

impl RequestMatcher {
    pub fn new(field: RequestField, matcher: ValueMatcher) -> Self {
        Self { field, matcher }
    }

    pub fn requester(matcher: ValueMatcher) -> Self {
        Self::new(RequestField::Requester, matcher)
    }

    pub fn issuer(matcher: ValueMatcher) -> Self {
        Self::new(RequestField::Issuer, matcher)
    }

    pub fn principal(matcher: ValueMatcher) -> Self {
        Self::new(RequestField::PrincipalName, matcher)
    }

    pub fn authentication_method(matcher: ValueMatcher) -> Self {
        Self::new(RequestField::AuthenticationMethod, matcher)
    }
}

impl MatchFunctor for RequestMatcher {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        let request = ctx.request();
        let candidate = match self.field {
            RequestField::Requester => request.requester(),
            RequestField::Issuer => request.local_entity_id.as_deref().or_else(|| request.issuer()),
            RequestField::PrincipalName => request.principal_name.as_deref(),
            RequestField::AuthenticationMethod => request.principal_authentication_method.as_deref(),
        };
        Ok(candidate.map_or(false, |candidate| self.matcher.matches(candidate)))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, _: &str, _: &AttributeValue) -> Result<bool> {
        self.evaluate_policy_requirement(ctx)
    }
}

/// True when some unfiltered value of `attribute_id` passes `test`
fn any_value_matches<F>(ctx: &FilteringContext<'_>, attribute_id: &str, mut test: F) -> bool
where
    F: FnMut(&AttributeValue) -> bool,
{
    ctx.attribute(attribute_id)
        .map_or(false, |attribute| attribute.values().iter().any(|value| test(value)))
}

/// Matches attribute values by their text
///
/// Without an attribute id the value being filtered is tested. With one,
/// a value of the filtered attribute matches only when that attribute is the
/// target; for any other attribute the functor matches when some value of
/// the target attribute matches.
#[derive(Debug, Clone)]
pub struct AttributeValueMatcher {
    attribute_id: Option<String>,
    matcher: ValueMatcher,
}

impl AttributeValueMatcher {
    pub fn new(matcher: ValueMatcher) -> Self {
        Self {
            attribute_id: None,
            matcher,
        }
    }

    pub fn for_attribute(attribute_id: impl Into<String>, matcher: ValueMatcher) -> Self {
        Self {
            attribute_id: Some(attribute_id.into()),
            matcher,
        }
    }

    fn test(&self, value: &AttributeValue) -> bool {
        self.matcher.matches(&value.text())
    }
}

impl MatchFunctor for AttributeValueMatcher {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        let attribute_id = self.attribute_id.as_deref().ok_or_else(|| {
            AttributeFilteringError::Processing(
                "attribute value functor used as a policy requirement needs an attribute id".to_string(),
            )
        })?;
        Ok(any_value_matches(ctx, attribute_id, |value| self.test(value)))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        match self.attribute_id.as_deref() {
            None => Ok(self.test(value)),
            Some(target) if target == attribute_id => Ok(self.test(value)),
            Some(target) => Ok(any_value_matches(ctx, target, |value| self.test(value))),
        }
    }
}

/// Matches the scope of scoped attribute values; unscoped values never match
///
/// Attribute id handling follows [`AttributeValueMatcher`].
#[derive(Debug, Clone)]
pub struct AttributeScopeMatcher {
    attribute_id: Option<String>,
    matcher: ValueMatcher,
}

impl AttributeScopeMatcher {
    pub fn new(matcher: ValueMatcher) -> Self {
        Self {
            attribute_id: None,
            matcher,
        }
    }

    pub fn for_attribute(attribute_id: impl Into<String>, matcher: ValueMatcher) -> Self {
        Self {
            attribute_id: Some(attribute_id.into()),
            matcher,
        }
    }

    fn test(&self, value: &AttributeValue) -> bool {
        value.scope().map_or(false, |scope| self.matcher.matches(scope))
    }
}

impl MatchFunctor for AttributeScopeMatcher {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        let attribute_id = self.attribute_id.as_deref().ok_or_else(|| {
            AttributeFilteringError::Processing(
                "attribute scope functor used as a policy requirement needs an attribute id".to_string(),
            )
        })?;
        Ok(any_value_matches(ctx, attribute_id, |value| self.test(value)))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        match self.attribute_id.as_deref() {
            None => Ok(self.test(value)),
            Some(target) if target == attribute_id => Ok(self.test(value)),
            Some(target) => Ok(any_value_matches(ctx, target, |value| self.test(value))),
        }
    }
}

/// Matches when an attribute has between `minimum` and `maximum` values
/// (inclusive); an absent attribute has zero values
#[derive(Debug, Clone)]
pub struct NumberOfAttributeValues {
    attribute_id: String,
    minimum: usize,
    maximum: usize,
}

impl NumberOfAttributeValues {
    pub fn new(attribute_id: impl Into<String>, minimum: usize, maximum: usize) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            minimum,
            maximum,
        }
    }
}

impl MatchFunctor for NumberOfAttributeValues {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        let count = ctx.attribute(&self.attribute_id).map_or(0, |a| a.len());
        Ok((self.minimum..=self.maximum).contains(&count))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, _: &str, _: &AttributeValue) -> Result<bool> {
        self.evaluate_policy_requirement(ctx)
    }

    fn validate(&self) -> Result<()> {
        if self.minimum > self.maximum {
            return Err(AttributeFilteringError::Processing(format!(
                "minimum {} exceeds maximum {} for '{}'",
                self.minimum, self.maximum, self.attribute_id
            )));
        }
        Ok(())
    }
}
