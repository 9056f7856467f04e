//! Attribute filtering engine
//!
//! # Architecture
//!
//! ```text
//! resolved attributes
//!        ↓
//! for each policy (in order)
//!   requirement false → skip policy
//!   requirement true  → permit rule per value → retained values
//!                       deny rule              → registered per attribute
//!        ↓
//! remove retained values matched by any deny rule
//!        ↓
//! released attributes (empty ones dropped)
//! ```
//!
//! Values not permitted by some applicable policy are never released, and a
//! deny match always overrides a permit.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info};

use attrflow_core::{Attribute, AttributeMap, AttributeRequestContext};

use crate::context::FilteringContext;
use crate::error::{AttributeFilteringError, Result};
use crate::policy::{validate_policies, AttributeFilterPolicy};

/// Applies the active filter policy group to resolved attributes
pub struct AttributeFilteringEngine {
    id: String,
    policies: RwLock<Arc<Vec<AttributeFilterPolicy>>>,
}

impl AttributeFilteringEngine {
    /// Engine with no policies; it releases nothing until reloaded
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            policies: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Engine with a validated policy group
    pub fn with_policies(id: impl Into<String>, policies: Vec<AttributeFilterPolicy>) -> Result<Self> {
        let engine = Self::new(id);
        engine.reload(policies)?;
        Ok(engine)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the active policy group
    pub fn policies(&self) -> Arc<Vec<AttributeFilterPolicy>> {
        Arc::clone(&self.policies.read())
    }

    /// Replace the policy group
    ///
    /// The new group is validated first; on failure the current group stays
    /// active.
    pub fn reload(&self, policies: Vec<AttributeFilterPolicy>) -> Result<()> {
        if let Err(source) = validate_policies(&policies) {
            error!("{} configuration is not valid, retaining old configuration: {}", self.id, source);
            return Err(AttributeFilteringError::InvalidConfiguration {
                service: self.id.clone(),
                source: Box::new(source),
            });
        }

        let count = policies.len();
        *self.policies.write() = Arc::new(policies);
        info!("Attribute filtering engine '{}' loaded {} policies", self.id, count);
        Ok(())
    }

    /// Filter `attributes` for `request`
    pub fn filter_attributes(
        &self,
        attributes: &AttributeMap,
        request: &AttributeRequestContext,
    ) -> Result<AttributeMap> {
        let policies = self.policies();
        if policies.is_empty() {
            debug!("No filter policies loaded in '{}', releasing nothing", self.id);
            return Ok(AttributeMap::new());
        }

        let mut ctx = FilteringContext::new(attributes, request);
        for policy in policies.iter() {
            Self::apply_policy(policy, &mut ctx)?;
        }
        Self::apply_deny_rules(&mut ctx)
    }

    fn apply_policy(policy: &AttributeFilterPolicy, ctx: &mut FilteringContext<'_>) -> Result<()> {
        if !policy.requirement().evaluate_policy_requirement(ctx)? {
            debug!("Filter policy '{}' does not apply to this request", policy.id());
            return Ok(());
        }
        debug!("Applying filter policy '{}'", policy.id());

        for rule in policy.attribute_rules() {
            let attribute_id = rule.attribute_id();
            let Some(attribute) = ctx.attribute(attribute_id) else {
                continue;
            };

            if let Some(permit) = rule.permit_value_rule() {
                if permit.matches_everything() {
                    let values = attribute.values().to_vec();
                    ctx.retain(attribute_id, values);
                } else {
                    let mut permitted = Vec::new();
                    for value in attribute.values() {
                        if permit.evaluate_permit_value(ctx, attribute_id, value)? {
                            permitted.push(value.clone());
                        }
                    }
                    ctx.retain(attribute_id, permitted);
                }
            }

            if let Some(deny) = rule.deny_value_rule() {
                ctx.add_deny_rule(attribute_id, Arc::clone(deny));
            }
        }
        Ok(())
    }

    fn apply_deny_rules(ctx: &mut FilteringContext<'_>) -> Result<AttributeMap> {
        let mut filtered = AttributeMap::new();
        for attribute_id in ctx.retained_attribute_ids() {
            let retained = ctx.take_retained(&attribute_id);
            let mut released = Vec::with_capacity(retained.len());

            'values: for value in retained {
                for deny in ctx.deny_rules(&attribute_id) {
                    if deny.evaluate_deny_rule(ctx, &attribute_id, &value)? {
                        debug!("Value of '{}' removed by deny rule", attribute_id);
                        continue 'values;
                    }
                }
                released.push(value);
            }

            if released.is_empty() {
                continue;
            }

            let mut attribute = Attribute::with_values(attribute_id.as_str(), released);
            if let Some(comparator) = ctx.attribute(&attribute_id).and_then(Attribute::comparator) {
                attribute.set_comparator(Arc::clone(comparator));
            }
            filtered.insert(attribute_id, attribute);
        }
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::{AnyMatcher, AttributeValueMatcher, ValueMatcher};
    use crate::policy::AttributeRule;

    fn attributes() -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert(
            "affiliation".into(),
            Attribute::with_values("affiliation", ["member", "staff", "student"]),
        );
        attributes
    }

    #[test]
    fn test_permit_then_deny() {
        let engine = AttributeFilteringEngine::with_policies(
            "filter",
            vec![AttributeFilterPolicy::new("p", Arc::new(AnyMatcher)).with_rule(
                AttributeRule::new("affiliation")
                    .permit(Arc::new(AnyMatcher))
                    .deny(Arc::new(AttributeValueMatcher::new(ValueMatcher::exact("staff", true)))),
            )],
        )
        .unwrap();

        let filtered = engine
            .filter_attributes(&attributes(), &AttributeRequestContext::new())
            .unwrap();
        let values: Vec<String> = filtered["affiliation"].values().iter().map(|v| v.to_string()).collect();

        assert_eq!(values, vec!["member", "student"]);
    }

    #[test]
    fn test_no_policies_release_nothing() {
        let engine = AttributeFilteringEngine::new("filter");
        let filtered = engine
            .filter_attributes(&attributes(), &AttributeRequestContext::new())
            .unwrap();
        assert!(filtered.is_empty());
    }
}
