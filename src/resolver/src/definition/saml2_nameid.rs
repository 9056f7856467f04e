//! SAML 2 name identifier definition

use async_trait::async_trait;

use attrflow_core::{Attribute, AttributeValue, NameIdentifierValue};

use crate::context::ResolutionContext;
use crate::error::Result;
use crate::plugin::{AttributeDefinition, DefinitionConfig, ResolutionPlugin};

/// Wraps each dependency value in a name identifier
///
/// The name qualifier defaults to the local entity id and the SP name
/// qualifier to the requester when not configured.
pub struct Saml2NameIdDefinition {
    config: DefinitionConfig,
    format: Option<String>,
    name_qualifier: Option<String>,
    sp_name_qualifier: Option<String>,
}

impl Saml2NameIdDefinition {
    pub fn new(config: DefinitionConfig) -> Self {
        Self {
            config,
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }
}

#[async_trait]
impl ResolutionPlugin for Saml2NameIdDefinition {
    fn id(&self) -> &str {
        self.config.id()
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }
}

#[async_trait]
impl AttributeDefinition for Saml2NameIdDefinition {
    fn is_dependency_only(&self) -> bool {
        self.config.dependency_only
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute> {
        let request = ctx.request();
        let name_qualifier = self
            .name_qualifier
            .clone()
            .or_else(|| request.local_entity_id.clone());
        let sp_name_qualifier = self
            .sp_name_qualifier
            .clone()
            .or_else(|| request.requester().map(str::to_string));

        let values = self
            .config
            .dependency_values(ctx)
            .into_iter()
            .filter(|value| !value.is_blank())
            .map(|value| {
                AttributeValue::NameId(NameIdentifierValue {
                    value: value.text().into_owned(),
                    format: self.format.clone(),
                    name_qualifier: name_qualifier.clone(),
                    sp_name_qualifier: sp_name_qualifier.clone(),
                })
            });

        Ok(Attribute::with_values(self.id(), values))
    }
}
