//! End-to-end attribute release tests

use std::sync::Arc;

use attrflow_core::{AttributeRequestContext, SubjectNameIdentifier};
use attrflow_filter::{
    AnyMatcher, AttributeFilterPolicy, AttributeFilteringEngine, AttributeRule, AttributeValueMatcher,
    RequestMatcher, ValueMatcher,
};
use attrflow_resolver::{
    AesGcmDataSealer, AttributeResolver, ConnectorConfig, CryptoTransientIdDefinition,
    CryptoTransientIdPrincipalConnector, DefinitionConfig, MappedAttributeDefinition, PluginConfig, PluginRegistry,
    PrescopedAttributeDefinition, ResolutionError, SimpleAttributeDefinition, SourceValue, StaticDataConnector,
    ValueMap,
};
use attrflow_authority::{AttributeAuthority, AuthorityError};

const TRANSIENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:transient";
const SP: &str = "https://sp.example.org";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn authority() -> AttributeAuthority {
    let sealer = Arc::new(AesGcmDataSealer::new(b"authority secret"));
    let registry = PluginRegistry::new()
        .with_data_connector(Arc::new(
            StaticDataConnector::new(ConnectorConfig::new("directory"))
                .with_attribute("uid", ["jdoe"])
                .with_attribute("mail", ["jdoe@example.org"])
                .with_attribute("affiliation", ["faculty", "student", "alum"])
                .with_attribute("eppn", ["jdoe@example.org"]),
        ))
        .unwrap()
        .with_attribute_definition(Arc::new(SimpleAttributeDefinition::new(
            DefinitionConfig::new("mail").depends_on("directory"),
        )))
        .unwrap()
        .with_attribute_definition(Arc::new(SimpleAttributeDefinition::new(
            DefinitionConfig::new("uid").depends_on("directory"),
        )))
        .unwrap()
        .with_attribute_definition(Arc::new(
            MappedAttributeDefinition::new(
                DefinitionConfig::new("eduPersonAffiliation")
                    .depends_on("directory")
                    .with_source_attribute("affiliation"),
                vec![
                    ValueMap::new("member").with_source(SourceValue::new("faculty|student")),
                    ValueMap::new("$0").with_source(SourceValue::new("faculty|student")),
                ],
            )
            .unwrap(),
        ))
        .unwrap()
        .with_attribute_definition(Arc::new(PrescopedAttributeDefinition::new(
            DefinitionConfig::new("eduPersonPrincipalName")
                .depends_on("directory")
                .with_source_attribute("eppn"),
        )))
        .unwrap()
        .with_attribute_definition(Arc::new(CryptoTransientIdDefinition::new(
            DefinitionConfig::new("transientId"),
            sealer.clone(),
        )))
        .unwrap()
        .with_principal_connector(Arc::new(CryptoTransientIdPrincipalConnector::new(
            PluginConfig::new("transient"),
            TRANSIENT,
            sealer,
        )))
        .unwrap();
    let resolver = AttributeResolver::with_validated_registry("resolver", registry)
        .await
        .unwrap();

    let policies = vec![
        AttributeFilterPolicy::new(
            "release-to-sp",
            Arc::new(RequestMatcher::requester(ValueMatcher::exact(SP, true))),
        )
        .with_rule(AttributeRule::new("mail").permit(Arc::new(AnyMatcher)))
        .with_rule(AttributeRule::new("transientId").permit(Arc::new(AnyMatcher)))
        .with_rule(AttributeRule::new("eduPersonPrincipalName").permit(Arc::new(AnyMatcher)))
        .with_rule(
            AttributeRule::new("eduPersonAffiliation")
                .permit(Arc::new(AnyMatcher))
                .deny(Arc::new(AttributeValueMatcher::new(ValueMatcher::exact("student", true)))),
        ),
    ];
    let filter = AttributeFilteringEngine::with_policies("filter", policies).unwrap();

    AttributeAuthority::new(Arc::new(resolver), Arc::new(filter))
}

fn request(requester: &str) -> AttributeRequestContext {
    AttributeRequestContext::new()
        .with_principal("jdoe")
        .with_issuer("https://idp.example.org")
        .with_requester(requester)
}

#[tokio::test]
async fn test_release_resolves_then_filters() {
    init_tracing();
    let authority = authority().await;

    let resolved = authority.resolve_attributes(&request(SP)).await.unwrap();
    assert!(resolved.contains_key("uid"));

    let released = authority.release_attributes(&request(SP)).await.unwrap();
    assert!(!released.contains_key("uid"), "uid has no permit rule");
    assert_eq!(released["mail"].values()[0].to_string(), "jdoe@example.org");

    let mut affiliation: Vec<String> = released["eduPersonAffiliation"]
        .values()
        .iter()
        .map(|v| v.to_string())
        .collect();
    affiliation.sort();
    assert_eq!(affiliation, vec!["faculty", "member"]);

    let eppn = &released["eduPersonPrincipalName"].values()[0];
    assert_eq!(eppn.scope(), Some("example.org"));
}

#[tokio::test]
async fn test_other_requester_receives_nothing() {
    let authority = authority().await;
    let released = authority
        .release_attributes(&request("https://other.example.org"))
        .await
        .unwrap();

    assert!(released.is_empty());
}

#[tokio::test]
async fn test_released_transient_id_maps_back_to_principal() {
    let authority = authority().await;
    let released = authority.release_attributes(&request(SP)).await.unwrap();
    let token = released["transientId"].values()[0].to_string();

    let lookup = AttributeRequestContext::new()
        .with_issuer("https://idp.example.org")
        .with_requester(SP)
        .with_subject(SubjectNameIdentifier::Saml2 {
            value: token,
            format: Some(TRANSIENT.to_string()),
            name_qualifier: Some("https://idp.example.org".to_string()),
            sp_name_qualifier: Some(SP.to_string()),
        });
    assert_eq!(authority.resolve_principal_name(&lookup).await.unwrap(), "jdoe");
}

#[tokio::test]
async fn test_resolution_failure_surfaces() {
    let authority = authority().await;
    // no requester: the transient identifier cannot be built
    let request = AttributeRequestContext::new()
        .with_principal("jdoe")
        .with_issuer("https://idp.example.org");

    let result = authority.release_attributes(&request).await;
    assert!(matches!(
        result,
        Err(AuthorityError::Resolution(ResolutionError::MissingRequestData("requester")))
    ));
}
