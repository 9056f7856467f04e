//! Entity attribute functors
//!
//! Match on attributes published in the `EntityAttributes` metadata
//! extension of the requester or the issuer. Missing metadata, extension or
//! attribute is a non-match, never an error.

use attrflow_core::{AttributeValue, EntityDescriptor};

use super::{MatchFunctor, ValueMatcher};
use crate::context::FilteringContext;
use crate::error::Result;

/// Whose metadata an [`EntityAttributeMatcher`] inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTarget {
    /// Peer (relying party) metadata
    Requester,
    /// Local entity metadata
    Issuer,
}

/// Matches when a named entity attribute has a value accepted by the matcher
#[derive(Debug, Clone)]
pub struct EntityAttributeMatcher {
    target: MetadataTarget,
    name: String,
    name_format: Option<String>,
    matcher: ValueMatcher,
}

impl EntityAttributeMatcher {
    pub fn new(target: MetadataTarget, name: impl Into<String>, matcher: ValueMatcher) -> Self {
        Self {
            target,
            name: name.into(),
            name_format: None,
            matcher,
        }
    }

    /// Require the entity attribute to carry this name format
    pub fn with_name_format(mut self, name_format: impl Into<String>) -> Self {
        self.name_format = Some(name_format.into());
        self
    }

    fn metadata<'a>(&self, ctx: &FilteringContext<'a>) -> Option<&'a EntityDescriptor> {
        let request = ctx.request();
        match self.target {
            MetadataTarget::Requester => request.peer_entity_metadata.as_ref(),
            MetadataTarget::Issuer => request.local_entity_metadata.as_ref(),
        }
    }

    fn matches(&self, ctx: &FilteringContext<'_>) -> bool {
        let Some(extension) = self.metadata(ctx).and_then(EntityDescriptor::entity_attributes) else {
            return false;
        };

        extension
            .attributes
            .iter()
            .filter(|attribute| attribute.name == self.name)
            .filter(|attribute| match &self.name_format {
                Some(format) => attribute.name_format.as_deref() == Some(format.as_str()),
                None => true,
            })
            .flat_map(|attribute| attribute.values.iter())
            .filter_map(|value| value.text())
            .any(|text| self.matcher.matches(text))
    }
}

impl MatchFunctor for EntityAttributeMatcher {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        Ok(self.matches(ctx))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, _: &str, _: &AttributeValue) -> Result<bool> {
        Ok(self.matches(ctx))
    }
}
