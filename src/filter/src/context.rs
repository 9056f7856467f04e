//! Per-request filtering state

use std::collections::HashMap;
use std::sync::Arc;

use attrflow_core::{Attribute, AttributeMap, AttributeRequestContext, AttributeValue};

use crate::functor::MatchFunctor;

/// State of one filtering call
///
/// Holds the unfiltered attributes and the request, the values retained so
/// far per attribute and the deny rules registered per attribute by the
/// policies that applied.
pub struct FilteringContext<'a> {
    unfiltered: &'a AttributeMap,
    request: &'a AttributeRequestContext,
    retained: HashMap<String, Vec<AttributeValue>>,
    deny_rules: HashMap<String, Vec<Arc<dyn MatchFunctor>>>,
}

impl<'a> FilteringContext<'a> {
    pub fn new(unfiltered: &'a AttributeMap, request: &'a AttributeRequestContext) -> Self {
        Self {
            unfiltered,
            request,
            retained: HashMap::new(),
            deny_rules: HashMap::new(),
        }
    }

    pub fn unfiltered_attributes(&self) -> &'a AttributeMap {
        self.unfiltered
    }

    /// Unfiltered attribute by id
    pub fn attribute(&self, attribute_id: &str) -> Option<&'a Attribute> {
        self.unfiltered.get(attribute_id)
    }

    pub fn request(&self) -> &'a AttributeRequestContext {
        self.request
    }

    /// Values kept so far for `attribute_id`
    ///
    /// Created on first access, either empty or holding every unfiltered
    /// value of the attribute.
    pub fn retained_values(&mut self, attribute_id: &str, prepopulate: bool) -> &mut Vec<AttributeValue> {
        let unfiltered = self.unfiltered;
        self.retained.entry(attribute_id.to_string()).or_insert_with(|| {
            match unfiltered.get(attribute_id) {
                Some(attribute) if prepopulate => attribute.values().to_vec(),
                _ => Vec::new(),
            }
        })
    }

    /// Add values to the retained set, ignoring ones already kept
    pub fn retain(&mut self, attribute_id: &str, values: impl IntoIterator<Item = AttributeValue>) {
        let retained = self.retained_values(attribute_id, false);
        for value in values {
            if !retained.contains(&value) {
                retained.push(value);
            }
        }
    }

    pub fn add_deny_rule(&mut self, attribute_id: &str, rule: Arc<dyn MatchFunctor>) {
        self.deny_rules
            .entry(attribute_id.to_string())
            .or_default()
            .push(rule);
    }

    /// Deny rules registered for `attribute_id`
    pub fn deny_rules(&self, attribute_id: &str) -> &[Arc<dyn MatchFunctor>] {
        self.deny_rules
            .get(attribute_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids of attributes with a retained-values entry
    pub fn retained_attribute_ids(&self) -> Vec<String> {
        self.retained.keys().cloned().collect()
    }

    pub(crate) fn take_retained(&mut self, attribute_id: &str) -> Vec<AttributeValue> {
        self.retained.remove(attribute_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert(
            "affiliation".into(),
            Attribute::with_values("affiliation", ["member", "staff"]),
        );
        attributes
    }

    #[test]
    fn test_retained_values_initialization() {
        let attributes = attributes();
        let request = AttributeRequestContext::new();
        let mut ctx = FilteringContext::new(&attributes, &request);

        assert!(ctx.retained_values("affiliation", false).is_empty());
        // already created, prepopulate no longer applies
        assert!(ctx.retained_values("affiliation", true).is_empty());

        let mut ctx = FilteringContext::new(&attributes, &request);
        assert_eq!(ctx.retained_values("affiliation", true).len(), 2);
        assert!(ctx.retained_values("missing", true).is_empty());
    }

    #[test]
    fn test_retain_ignores_duplicates() {
        let attributes = attributes();
        let request = AttributeRequestContext::new();
        let mut ctx = FilteringContext::new(&attributes, &request);

        ctx.retain("affiliation", [AttributeValue::from("member")]);
        ctx.retain("affiliation", [AttributeValue::from("member"), AttributeValue::from("staff")]);

        assert_eq!(ctx.retained_values("affiliation", false).len(), 2);
        assert_eq!(ctx.retained_attribute_ids(), vec!["affiliation".to_string()]);
        assert!(ctx.deny_rules("affiliation").is_empty());
    }
}
