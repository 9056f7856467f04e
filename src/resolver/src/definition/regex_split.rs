//! Regular-expression split definition

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use attrflow_core::Attribute;

use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};
use crate::plugin::{AttributeDefinition, DefinitionConfig, ResolutionPlugin};

/// Emits the first capture group of `regex` for every matching value
pub struct RegexSplitDefinition {
    config: DefinitionConfig,
    regex: Regex,
}

impl RegexSplitDefinition {
    pub fn new(config: DefinitionConfig, pattern: &str, ignore_case: bool) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| ResolutionError::invalid_config(config.id(), format!("invalid regex: {}", e)))?;
        if regex.captures_len() < 2 {
            return Err(ResolutionError::invalid_config(
                config.id(),
                "regex must contain a capture group",
            ));
        }
        Ok(Self { config, regex })
    }
}

#[async_trait]
impl ResolutionPlugin for RegexSplitDefinition {
    fn id(&self) -> &str {
        self.config.id()
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }
}

#[async_trait]
impl AttributeDefinition for RegexSplitDefinition {
    fn is_dependency_only(&self) -> bool {
        self.config.dependency_only
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute> {
        let mut attribute = Attribute::new(self.id());
        for value in self.config.dependency_values(ctx) {
            let text = value.text();
            if let Some(group) = self.regex.captures(&text).and_then(|c| c.get(1)) {
                attribute.add_value(group.as_str());
            }
        }
        Ok(attribute)
    }
}
