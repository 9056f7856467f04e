//! Boolean combinators
//!
//! Children are evaluated left to right and evaluation stops as soon as the
//! outcome is known, in every mode.

use std::sync::Arc;

use attrflow_core::AttributeValue;

use super::MatchFunctor;
use crate::context::FilteringContext;
use crate::error::{AttributeFilteringError, Result};

/// True when every child is true; false when there are no children
pub struct And {
    children: Vec<Arc<dyn MatchFunctor>>,
}

impl And {
    pub fn new(children: Vec<Arc<dyn MatchFunctor>>) -> Self {
        Self { children }
    }
}

/// True when any child is true
pub struct Or {
    children: Vec<Arc<dyn MatchFunctor>>,
}

impl Or {
    pub fn new(children: Vec<Arc<dyn MatchFunctor>>) -> Self {
        Self { children }
    }
}

/// Negates its child
pub struct Not {
    child: Arc<dyn MatchFunctor>,
}

impl Not {
    pub fn new(child: Arc<dyn MatchFunctor>) -> Self {
        Self { child }
    }
}

fn all<F>(children: &[Arc<dyn MatchFunctor>], mut eval: F) -> Result<bool>
where
    F: FnMut(&dyn MatchFunctor) -> Result<bool>,
{
    if children.is_empty() {
        return Ok(false);
    }
    for child in children {
        if !eval(child.as_ref())? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any<F>(children: &[Arc<dyn MatchFunctor>], mut eval: F) -> Result<bool>
where
    F: FnMut(&dyn MatchFunctor) -> Result<bool>,
{
    for child in children {
        if eval(child.as_ref())? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn validate_children(children: &[Arc<dyn MatchFunctor>], name: &str) -> Result<()> {
    if children.is_empty() {
        return Err(AttributeFilteringError::Processing(format!(
            "{} functor requires at least one child",
            name
        )));
    }
    children.iter().try_for_each(|child| child.validate())
}

impl MatchFunctor for And {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        all(&self.children, |child| child.evaluate_policy_requirement(ctx))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        all(&self.children, |child| child.evaluate_permit_value(ctx, attribute_id, value))
    }

    fn evaluate_deny_rule(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        all(&self.children, |child| child.evaluate_deny_rule(ctx, attribute_id, value))
    }

    fn validate(&self) -> Result<()> {
        validate_children(&self.children, "AND")
    }
}

impl MatchFunctor for Or {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        any(&self.children, |child| child.evaluate_policy_requirement(ctx))
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        any(&self.children, |child| child.evaluate_permit_value(ctx, attribute_id, value))
    }

    fn evaluate_deny_rule(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        any(&self.children, |child| child.evaluate_deny_rule(ctx, attribute_id, value))
    }

    fn matches_everything(&self) -> bool {
        self.children.iter().any(|child| child.matches_everything())
    }

    fn validate(&self) -> Result<()> {
        validate_children(&self.children, "OR")
    }
}

impl MatchFunctor for Not {
    fn evaluate_policy_requirement(&self, ctx: &FilteringContext<'_>) -> Result<bool> {
        Ok(!self.child.evaluate_policy_requirement(ctx)?)
    }

    fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        Ok(!self.child.evaluate_permit_value(ctx, attribute_id, value)?)
    }

    fn evaluate_deny_rule(&self, ctx: &FilteringContext<'_>, attribute_id: &str, value: &AttributeValue) -> Result<bool> {
        Ok(!self.child.evaluate_deny_rule(ctx, attribute_id, value)?)
    }

    fn validate(&self) -> Result<()> {
        self.child.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functor::AnyMatcher;
    use attrflow_core::{AttributeMap, AttributeRequestContext};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed outcome, counting evaluations
    struct Fixed {
        outcome: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(outcome: bool) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl MatchFunctor for Fixed {
        fn evaluate_policy_requirement(&self, _ctx: &FilteringContext<'_>) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome)
        }

        fn evaluate_permit_value(&self, ctx: &FilteringContext<'_>, _: &str, _: &AttributeValue) -> Result<bool> {
            self.evaluate_policy_requirement(ctx)
        }
    }

    #[test]
    fn test_short_circuit() {
        let attributes = AttributeMap::new();
        let request = AttributeRequestContext::new();
        let ctx = FilteringContext::new(&attributes, &request);

        let skipped = Fixed::new(true);
        let children: Vec<Arc<dyn MatchFunctor>> = vec![Fixed::new(false), skipped.clone()];
        let and = And::new(children);
        assert!(!and.evaluate_policy_requirement(&ctx).unwrap());

        let children: Vec<Arc<dyn MatchFunctor>> = vec![Fixed::new(true), skipped.clone()];
        let or = Or::new(children);
        assert!(or.evaluate_policy_requirement(&ctx).unwrap());

        assert_eq!(skipped.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_not_and_empty_children() {
        let attributes = AttributeMap::new();
        let request = AttributeRequestContext::new();
        let ctx = FilteringContext::new(&attributes, &request);
        let value = AttributeValue::from("x");

        let not = Not::new(Arc::new(AnyMatcher));
        assert!(!not.evaluate_permit_value(&ctx, "a", &value).unwrap());
        assert!(!not.evaluate_deny_rule(&ctx, "a", &value).unwrap());

        assert!(!And::new(Vec::new()).evaluate_policy_requirement(&ctx).unwrap());
        assert!(!Or::new(Vec::new()).evaluate_policy_requirement(&ctx).unwrap());
        assert!(And::new(Vec::new()).validate().is_err());
        let children: Vec<Arc<dyn MatchFunctor>> = vec![Arc::new(AnyMatcher)];
        assert!(Or::new(children).matches_everything());
    }
}
