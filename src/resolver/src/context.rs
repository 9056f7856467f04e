//! Per-request resolution memo
//!
//! A [`ResolutionContext`] lives for one top-level resolution call. It records
//! every plugin result so that each plugin runs at most once per request, and
//! tracks the plugins currently being resolved so that dependency cycles are
//! reported instead of recursing forever.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use attrflow_core::{Attribute, AttributeMap, AttributeRequestContext, AttributeValue};

use crate::error::{ResolutionError, Result};

/// Memoized result of a resolved plugin
#[derive(Debug, Clone)]
pub enum ResolvedPlugin {
    DataConnector(Arc<AttributeMap>),
    AttributeDefinition(Arc<Attribute>),
}

/// Per-request resolution state
#[derive(Debug)]
pub struct ResolutionContext {
    request: AttributeRequestContext,
    resolved: Mutex<HashMap<String, ResolvedPlugin>>,
    in_progress: Mutex<Vec<String>>,
}

impl ResolutionContext {
    pub fn new(request: AttributeRequestContext) -> Self {
        Self {
            request,
            resolved: Mutex::new(HashMap::new()),
            in_progress: Mutex::new(Vec::new()),
        }
    }

    pub fn request(&self) -> &AttributeRequestContext {
        &self.request
    }

    /// Memoized connector result
    pub fn resolved_data_connector(&self, id: &str) -> Option<Arc<AttributeMap>> {
        match self.resolved.lock().get(id) {
            Some(ResolvedPlugin::DataConnector(attributes)) => Some(Arc::clone(attributes)),
            _ => None,
        }
    }

    /// Memoized definition result
    pub fn resolved_attribute_definition(&self, id: &str) -> Option<Arc<Attribute>> {
        match self.resolved.lock().get(id) {
            Some(ResolvedPlugin::AttributeDefinition(attribute)) => Some(Arc::clone(attribute)),
            _ => None,
        }
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.resolved.lock().contains_key(id)
    }

    /// Ids of every plugin resolved so far
    pub fn resolved_ids(&self) -> Vec<String> {
        self.resolved.lock().keys().cloned().collect()
    }

    pub(crate) fn record_data_connector(&self, id: &str, attributes: Arc<AttributeMap>) {
        self.resolved
            .lock()
            .insert(id.to_string(), ResolvedPlugin::DataConnector(attributes));
    }

    pub(crate) fn record_attribute_definition(&self, id: &str, attribute: Arc<Attribute>) {
        self.resolved
            .lock()
            .insert(id.to_string(), ResolvedPlugin::AttributeDefinition(attribute));
    }

    /// Mark `id` as being resolved
    ///
    /// # Errors
    ///
    /// Fails with the full cycle path if `id` is already on the resolution stack.
    pub(crate) fn enter(&self, id: &str) -> Result<()> {
        let mut stack = self.in_progress.lock();
        if let Some(start) = stack.iter().position(|entry| entry == id) {
            let mut path: Vec<&str> = stack[start..].iter().map(String::as_str).collect();
            path.push(id);
            return Err(ResolutionError::CircularDependency(path.join(" -> ")));
        }
        stack.push(id.to_string());
        Ok(())
    }

    pub(crate) fn exit(&self, id: &str) {
        let mut stack = self.in_progress.lock();
        if let Some(position) = stack.iter().rposition(|entry| entry == id) {
            stack.remove(position);
        }
    }

    /// Values of `source_attribute_id` across the given dependencies
    ///
    /// Definition dependencies contribute all of their values; connector
    /// dependencies contribute the values of their `source_attribute_id`
    /// attribute. Unresolved dependencies contribute nothing.
    pub fn dependency_values(
        &self,
        dependency_ids: &[String],
        source_attribute_id: &str,
    ) -> Vec<AttributeValue> {
        let resolved = self.resolved.lock();
        let mut values = Vec::new();
        for dependency_id in dependency_ids {
            match resolved.get(dependency_id) {
                Some(ResolvedPlugin::AttributeDefinition(attribute)) => {
                    values.extend(attribute.values().iter().cloned());
                }
                Some(ResolvedPlugin::DataConnector(attributes)) => {
                    if let Some(attribute) = attributes.get(source_attribute_id) {
                        values.extend(attribute.values().iter().cloned());
                    }
                }
                None => {}
            }
        }
        values
    }

    /// Every attribute produced by the given dependencies, merged by id
    pub fn dependency_attributes(&self, dependency_ids: &[String]) -> AttributeMap {
        let resolved = self.resolved.lock();
        let mut merged = AttributeMap::new();
        let mut merge = |attribute: &Attribute| {
            merged
                .entry(attribute.id().to_string())
                .or_insert_with(|| Attribute::new(attribute.id()))
                .extend_values(attribute.values().iter().cloned());
        };

        for dependency_id in dependency_ids {
            match resolved.get(dependency_id) {
                Some(ResolvedPlugin::AttributeDefinition(attribute)) => merge(attribute.as_ref()),
                Some(ResolvedPlugin::DataConnector(attributes)) => {
                    attributes.values().for_each(&mut merge);
                }
                None => {}
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ResolutionContext {
        ResolutionContext::new(AttributeRequestContext::new().with_principal("jdoe"))
    }

    #[test]
    fn test_enter_detects_cycle_with_path() {
        let ctx = context();
        ctx.enter("a").unwrap();
        ctx.enter("b").unwrap();

        let err = ctx.enter("a").unwrap_err();
        match err {
            ResolutionError::CircularDependency(path) => assert_eq!(path, "a -> b -> a"),
            other => panic!("unexpected error: {other}"),
        }

        ctx.exit("b");
        ctx.exit("a");
        assert!(ctx.enter("a").is_ok());
    }

    #[test]
    fn test_dependency_values_by_plugin_kind() {
        let ctx = context();

        let mut ldap = AttributeMap::new();
        ldap.insert("mail".into(), Attribute::with_values("mail", ["a@example.org"]));
        ldap.insert("uid".into(), Attribute::with_values("uid", ["jdoe"]));
        ctx.record_data_connector("ldap", Arc::new(ldap));
        ctx.record_attribute_definition(
            "alias",
            Arc::new(Attribute::with_values("alias", ["b@example.org"])),
        );

        let deps = vec!["ldap".to_string(), "alias".to_string(), "missing".to_string()];
        let values = ctx.dependency_values(&deps, "mail");
        assert_eq!(
            values,
            vec![AttributeValue::from("a@example.org"), AttributeValue::from("b@example.org")]
        );

        let merged = ctx.dependency_attributes(&deps);
        assert_eq!(merged.len(), 3);
        assert!(merged.contains_key("uid"));
    }

    #[test]
    fn test_typed_views_do_not_cross() {
        let ctx = context();
        ctx.record_data_connector("static", Arc::new(AttributeMap::new()));

        assert!(ctx.resolved_data_connector("static").is_some());
        assert!(ctx.resolved_attribute_definition("static").is_none());
        assert!(ctx.is_resolved("static"));
    }
}
