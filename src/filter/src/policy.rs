//! Filter policies and attribute rules

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AttributeFilteringError, Result};
use crate::functor::MatchFunctor;

/// Permit and deny rules for one attribute
#[derive(Clone)]
pub struct AttributeRule {
    attribute_id: String,
    permit_value_rule: Option<Arc<dyn MatchFunctor>>,
    deny_value_rule: Option<Arc<dyn MatchFunctor>>,
}

impl AttributeRule {
    pub fn new(attribute_id: impl Into<String>) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            permit_value_rule: None,
            deny_value_rule: None,
        }
    }

    pub fn permit(mut self, rule: Arc<dyn MatchFunctor>) -> Self {
        self.permit_value_rule = Some(rule);
        self
    }

    pub fn deny(mut self, rule: Arc<dyn MatchFunctor>) -> Self {
        self.deny_value_rule = Some(rule);
        self
    }

    pub fn attribute_id(&self) -> &str {
        &self.attribute_id
    }

    pub fn permit_value_rule(&self) -> Option<&Arc<dyn MatchFunctor>> {
        self.permit_value_rule.as_ref()
    }

    pub fn deny_value_rule(&self) -> Option<&Arc<dyn MatchFunctor>> {
        self.deny_value_rule.as_ref()
    }
}

/// Attribute rules guarded by a policy requirement
#[derive(Clone)]
pub struct AttributeFilterPolicy {
    id: String,
    requirement: Arc<dyn MatchFunctor>,
    attribute_rules: Vec<AttributeRule>,
}

impl AttributeFilterPolicy {
    pub fn new(id: impl Into<String>, requirement: Arc<dyn MatchFunctor>) -> Self {
        Self {
            id: id.into(),
            requirement,
            attribute_rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: AttributeRule) -> Self {
        self.attribute_rules.push(rule);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn requirement(&self) -> &Arc<dyn MatchFunctor> {
        &self.requirement
    }

    pub fn attribute_rules(&self) -> &[AttributeRule] {
        &self.attribute_rules
    }

    /// Check the policy and every functor it references
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(AttributeFilteringError::invalid_policy("", "policy id is empty"));
        }

        self.requirement
            .validate()
            .map_err(|e| AttributeFilteringError::invalid_policy(&self.id, format!("requirement: {}", e)))?;

        for rule in &self.attribute_rules {
            if rule.attribute_id.is_empty() {
                return Err(AttributeFilteringError::invalid_policy(&self.id, "attribute rule without attribute id"));
            }
            for functor in rule.permit_value_rule.iter().chain(rule.deny_value_rule.iter()) {
                functor.validate().map_err(|e| {
                    AttributeFilteringError::invalid_policy(
                        &self.id,
                        format!("rule for '{}': {}", rule.attribute_id, e),
                    )
                })?;
            }
        }
        Ok(())
    }
}

/// Validate a policy group; ids must be unique
pub fn validate_policies(policies: &[AttributeFilterPolicy]) -> Result<()> {
    let mut seen = HashSet::new();
    for policy in policies {
        if !seen.insert(policy.id()) {
            return Err(AttributeFilteringError::DuplicatePolicy(policy.id().to_string()));
        }
        policy.validate()?;
    }
    Ok(())
}
