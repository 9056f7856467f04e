//! Definition for values that already carry their scope

use async_trait::async_trait;

use attrflow_core::{Attribute, AttributeValue, ScopedValue};

use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};
use crate::plugin::{AttributeDefinition, DefinitionConfig, ResolutionPlugin};

pub const DEFAULT_SCOPE_DELIMITER: &str = "@";

/// Splits `value<delimiter>scope` dependency values into scoped values
pub struct PrescopedAttributeDefinition {
    config: DefinitionConfig,
    scope_delimiter: String,
}

impl PrescopedAttributeDefinition {
    pub fn new(config: DefinitionConfig) -> Self {
        Self {
            config,
            scope_delimiter: DEFAULT_SCOPE_DELIMITER.to_string(),
        }
    }

    pub fn with_scope_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.scope_delimiter = delimiter.into();
        self
    }
}

#[async_trait]
impl ResolutionPlugin for PrescopedAttributeDefinition {
    fn id(&self) -> &str {
        self.config.id()
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }

    async fn validate(&self) -> Result<()> {
        if self.scope_delimiter.is_empty() {
            return Err(ResolutionError::invalid_config(self.id(), "scope delimiter must not be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl AttributeDefinition for PrescopedAttributeDefinition {
    fn is_dependency_only(&self) -> bool {
        self.config.dependency_only
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute> {
        let mut attribute = Attribute::new(self.id());
        for value in self.config.dependency_values(ctx) {
            let scoped = ScopedValue::parse(&value.text(), &self.scope_delimiter)
                .map_err(|e| ResolutionError::definition(self.id(), e))?;
            attribute.add_value(AttributeValue::Scoped(scoped));
        }
        Ok(attribute)
    }
}
