//! Pass-through attribute definition

use async_trait::async_trait;

use attrflow_core::Attribute;

use crate::context::ResolutionContext;
use crate::error::Result;
use crate::plugin::{AttributeDefinition, DefinitionConfig, ResolutionPlugin};

/// Releases the values of its dependencies unchanged
pub struct SimpleAttributeDefinition {
    config: DefinitionConfig,
}

impl SimpleAttributeDefinition {
    pub fn new(config: DefinitionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResolutionPlugin for SimpleAttributeDefinition {
    fn id(&self) -> &str {
        self.config.id()
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }
}

#[async_trait]
impl AttributeDefinition for SimpleAttributeDefinition {
    fn is_dependency_only(&self) -> bool {
        self.config.dependency_only
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute> {
        Ok(Attribute::with_values(self.id(), self.config.dependency_values(ctx)))
    }
}
