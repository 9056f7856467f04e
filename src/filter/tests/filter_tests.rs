//! Attribute filtering engine integration tests
//!
//! Default deny, deny-over-permit, policy requirements and reload.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use attrflow_core::{
    Attribute, AttributeMap, AttributeRequestContext, AttributeValue, EntityAttribute, EntityAttributeValue,
    EntityDescriptor,
};
use attrflow_filter::{
    AnyMatcher, AttributeFilterPolicy, AttributeFilteringEngine, AttributeFilteringError, AttributeRule,
    AttributeValueMatcher, EntityAttributeMatcher, MatchFunctor, MetadataTarget, Not, Or, RequestMatcher,
    ValueMatcher,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn attributes() -> AttributeMap {
    let mut attributes = AttributeMap::new();
    attributes.insert(
        "affiliation".into(),
        Attribute::with_values("affiliation", ["member", "staff", "student"]),
    );
    attributes.insert("mail".into(), Attribute::with_values("mail", ["jdoe@example.org"]));
    attributes.insert("uid".into(), Attribute::with_values("uid", ["jdoe"]));
    attributes
}

fn request() -> AttributeRequestContext {
    AttributeRequestContext::new()
        .with_principal("jdoe")
        .with_issuer("https://idp.example.org")
        .with_requester("https://sp.example.org")
}

fn requester(entity_id: &str) -> Arc<RequestMatcher> {
    Arc::new(RequestMatcher::requester(ValueMatcher::exact(entity_id, true)))
}

fn value(v: &str) -> Arc<AttributeValueMatcher> {
    Arc::new(AttributeValueMatcher::new(ValueMatcher::exact(v, true)))
}

fn strings(filtered: &AttributeMap, id: &str) -> Vec<String> {
    filtered[id].values().iter().map(|v| v.to_string()).collect()
}

// ============================================================================
// DEFAULT DENY
// ============================================================================

#[test]
fn test_unpermitted_attributes_are_withheld() {
    init_tracing();
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![AttributeFilterPolicy::new("mail-to-sp", requester("https://sp.example.org"))
            .with_rule(AttributeRule::new("mail").permit(Arc::new(AnyMatcher)))],
    )
    .unwrap();

    let filtered = engine.filter_attributes(&attributes(), &request()).unwrap();

    assert_eq!(filtered.len(), 1);
    assert_eq!(strings(&filtered, "mail"), vec!["jdoe@example.org"]);
}

#[test]
fn test_attribute_with_no_permitted_values_is_absent() {
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![AttributeFilterPolicy::new("p", Arc::new(AnyMatcher))
            .with_rule(AttributeRule::new("affiliation").permit(value("faculty")))],
    )
    .unwrap();

    let filtered = engine.filter_attributes(&attributes(), &request()).unwrap();
    assert!(!filtered.contains_key("affiliation"));
}

// ============================================================================
// DENY OVERRIDES PERMIT
// ============================================================================

#[test]
fn test_deny_from_other_policy_wins() {
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![
            AttributeFilterPolicy::new("release", Arc::new(AnyMatcher))
                .with_rule(AttributeRule::new("affiliation").permit(Arc::new(AnyMatcher))),
            AttributeFilterPolicy::new("withhold-student", Arc::new(AnyMatcher))
                .with_rule(AttributeRule::new("affiliation").deny(value("student"))),
        ],
    )
    .unwrap();

    let filtered = engine.filter_attributes(&attributes(), &request()).unwrap();
    assert_eq!(strings(&filtered, "affiliation"), vec!["member", "staff"]);
}

#[test]
fn test_deny_everything() {
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![AttributeFilterPolicy::new("p", Arc::new(AnyMatcher)).with_rule(
            AttributeRule::new("uid")
                .permit(Arc::new(AnyMatcher))
                .deny(Arc::new(AnyMatcher)),
        )],
    )
    .unwrap();

    assert!(engine.filter_attributes(&attributes(), &request()).unwrap().is_empty());
}

// ============================================================================
// POLICY REQUIREMENTS
// ============================================================================

#[test]
fn test_inapplicable_policy_has_no_effect() {
    let only_other_sp = AttributeFilterPolicy::new("other-sp", requester("https://other.example.org"))
        .with_rule(AttributeRule::new("affiliation").permit(Arc::new(AnyMatcher)));

    let engine = AttributeFilteringEngine::with_policies("filter", vec![only_other_sp.clone()]).unwrap();
    assert!(engine.filter_attributes(&attributes(), &request()).unwrap().is_empty());

    let this_sp = AttributeFilterPolicy::new("this-sp", requester("https://sp.example.org"))
        .with_rule(AttributeRule::new("affiliation").permit(value("member")));
    let engine = AttributeFilteringEngine::with_policies("filter", vec![only_other_sp, this_sp]).unwrap();

    let filtered = engine.filter_attributes(&attributes(), &request()).unwrap();
    assert_eq!(strings(&filtered, "affiliation"), vec!["member"]);
}

#[test]
fn test_combined_requirement_with_entity_attribute() {
    let peer = EntityDescriptor::new("https://sp.example.org").with_entity_attributes(vec![EntityAttribute::new(
        "http://macedir.org/entity-category",
        vec![EntityAttributeValue::string("http://refeds.org/category/research-and-scholarship")],
    )]);
    let children: Vec<Arc<dyn MatchFunctor>> = vec![
        Arc::new(EntityAttributeMatcher::new(
            MetadataTarget::Requester,
            "http://macedir.org/entity-category",
            ValueMatcher::regex(".*/research-and-scholarship").unwrap(),
        )),
        requester("https://trusted.example.org"),
    ];
    let requirement = Arc::new(Or::new(children));
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![AttributeFilterPolicy::new("r-and-s", requirement).with_rule(
            AttributeRule::new("affiliation").permit(Arc::new(Not::new(value("student")))),
        )],
    )
    .unwrap();

    let filtered = engine
        .filter_attributes(&attributes(), &request().with_peer_metadata(peer))
        .unwrap();
    assert_eq!(strings(&filtered, "affiliation"), vec!["member", "staff"]);

    assert!(engine.filter_attributes(&attributes(), &request()).unwrap().is_empty());
}

#[test]
fn test_functor_error_surfaces() {
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![AttributeFilterPolicy::new("p", value("member"))],
    )
    .unwrap();

    let result = engine.filter_attributes(&attributes(), &request());
    assert!(matches!(result, Err(AttributeFilteringError::Processing(_))));
}

// ============================================================================
// RELOAD
// ============================================================================

#[test]
fn test_invalid_reload_keeps_policies() {
    let engine = AttributeFilteringEngine::with_policies(
        "filter",
        vec![AttributeFilterPolicy::new("p", Arc::new(AnyMatcher))
            .with_rule(AttributeRule::new("uid").permit(Arc::new(AnyMatcher)))],
    )
    .unwrap();

    let duplicate = vec![
        AttributeFilterPolicy::new("q", Arc::new(AnyMatcher)),
        AttributeFilterPolicy::new("q", Arc::new(AnyMatcher)),
    ];
    assert!(matches!(
        engine.reload(duplicate),
        Err(AttributeFilteringError::InvalidConfiguration { .. })
    ));
    assert_eq!(engine.policies().len(), 1);

    let filtered = engine.filter_attributes(&attributes(), &request()).unwrap();
    assert_eq!(strings(&filtered, "uid"), vec!["jdoe"]);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_released_values_are_permitted_and_not_denied(
        values in proptest::collection::vec("[a-d]{1,2}", 1..12),
        permitted in proptest::collection::hash_set("[a-d]{1,2}", 0..6),
        denied in proptest::collection::hash_set("[a-d]{1,2}", 0..3),
    ) {
        let mut unfiltered = AttributeMap::new();
        unfiltered.insert("attr".into(), Attribute::with_values("attr", values.iter().map(String::as_str)));

        let permit: Vec<Arc<dyn MatchFunctor>> =
            permitted.iter().map(|v| value(v) as Arc<dyn MatchFunctor>).collect();
        let deny: Vec<Arc<dyn MatchFunctor>> =
            denied.iter().map(|v| value(v) as Arc<dyn MatchFunctor>).collect();

        let mut rule = AttributeRule::new("attr");
        if !permit.is_empty() {
            rule = rule.permit(Arc::new(Or::new(permit)));
        }
        if !deny.is_empty() {
            rule = rule.deny(Arc::new(Or::new(deny)));
        }
        let engine = AttributeFilteringEngine::with_policies(
            "filter",
            vec![AttributeFilterPolicy::new("p", Arc::new(AnyMatcher)).with_rule(rule)],
        ).unwrap();

        let filtered = engine.filter_attributes(&unfiltered, &AttributeRequestContext::new()).unwrap();
        let released: HashSet<String> = filtered
            .get("attr")
            .map(|a| a.values().iter().map(AttributeValue::to_string).collect())
            .unwrap_or_default();

        let expected: HashSet<String> = values
            .iter()
            .filter(|v| permitted.contains(*v) && !denied.contains(*v))
            .cloned()
            .collect();
        prop_assert_eq!(released, expected);
    }
}
