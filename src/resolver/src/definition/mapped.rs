//! Value-mapping attribute definition
//!
//! Each dependency value is run through an ordered list of value maps. A value
//! map holds one or more source rules (regular expressions, matched fully or
//! partially) and a return value that may reference capture groups as `$1`.
//! A group reference followed by word characters must be braced: `$1x` names
//! a group called `1x`, write `${1}x` instead.
//!
//! A value that matches several maps yields each distinct result once.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use attrflow_core::{Attribute, AttributeValue};

use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};
use crate::plugin::{AttributeDefinition, DefinitionConfig, ResolutionPlugin};

/// One source rule of a value map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceValue {
    /// Regular expression matched against the dependency value
    pub value: String,
    #[serde(default)]
    pub ignore_case: bool,
    /// Match anywhere in the value instead of the whole value
    #[serde(default)]
    pub partial_match: bool,
}

impl SourceValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ignore_case: false,
            partial_match: false,
        }
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn partial_match(mut self, partial_match: bool) -> Self {
        self.partial_match = partial_match;
        self
    }

    fn compile(&self) -> std::result::Result<Regex, regex::Error> {
        let pattern = if self.partial_match {
            self.value.clone()
        } else {
            format!("^(?:{})$", self.value)
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(self.ignore_case)
            .build()
    }
}

/// Replacement value and the source rules that trigger it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMap {
    pub return_value: String,
    pub source_values: Vec<SourceValue>,
}

impl ValueMap {
    pub fn new(return_value: impl Into<String>) -> Self {
        Self {
            return_value: return_value.into(),
            source_values: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: SourceValue) -> Self {
        self.source_values.push(source);
        self
    }
}

struct CompiledValueMap {
    return_value: String,
    patterns: Vec<Regex>,
}

impl CompiledValueMap {
    /// Results of every matching source rule
    fn evaluate(&self, value: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|pattern| pattern.is_match(value))
            .map(|pattern| pattern.replace_all(value, self.return_value.as_str()).into_owned())
            .collect()
    }
}

/// Maps dependency values to configured return values
pub struct MappedAttributeDefinition {
    config: DefinitionConfig,
    value_maps: Vec<CompiledValueMap>,
    default_value: Option<String>,
    pass_thru: bool,
}

impl MappedAttributeDefinition {
    /// Compile the value maps; an invalid expression is a configuration error
    pub fn new(config: DefinitionConfig, value_maps: Vec<ValueMap>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(value_maps.len());
        for map in value_maps {
            let mut patterns = Vec::with_capacity(map.source_values.len());
            for source in &map.source_values {
                patterns.push(source.compile().map_err(|e| {
                    ResolutionError::invalid_config(config.id(), format!("invalid source value '{}': {}", source.value, e))
                })?);
            }
            compiled.push(CompiledValueMap {
                return_value: map.return_value,
                patterns,
            });
        }

        Ok(Self {
            config,
            value_maps: compiled,
            default_value: None,
            pass_thru: false,
        })
    }

    /// Value used when nothing maps
    pub fn with_default_value(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Keep unmapped values as they are
    pub fn pass_thru(mut self, pass_thru: bool) -> Self {
        self.pass_thru = pass_thru;
        self
    }

    fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref().filter(|v| !v.is_empty())
    }

    fn map_value(&self, value: &str) -> Vec<String> {
        let mut mapped: Vec<String> = Vec::new();
        for result in self.value_maps.iter().flat_map(|map| map.evaluate(value)) {
            if !mapped.contains(&result) {
                mapped.push(result);
            }
        }
        if !mapped.is_empty() {
            return mapped;
        }

        if self.pass_thru {
            vec![value.to_string()]
        } else if let Some(default_value) = self.default_value() {
            vec![default_value.to_string()]
        } else {
            debug!("Attribute definition '{}' dropped unmapped value", self.id());
            Vec::new()
        }
    }
}

#[async_trait]
impl ResolutionPlugin for MappedAttributeDefinition {
    fn id(&self) -> &str {
        self.config.id()
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }

    async fn validate(&self) -> Result<()> {
        if self.pass_thru && self.default_value().is_some() {
            return Err(ResolutionError::invalid_config(
                self.id(),
                "pass-thru and a default value cannot both be configured",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AttributeDefinition for MappedAttributeDefinition {
    fn is_dependency_only(&self) -> bool {
        self.config.dependency_only
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute> {
        let values = self.config.dependency_values(ctx);
        let mut attribute = Attribute::new(self.id());

        if values.is_empty() {
            if let Some(default_value) = self.default_value() {
                attribute.add_value(default_value);
            }
            return Ok(attribute);
        }

        for value in values.iter().filter(|v| !v.is_blank()) {
            attribute.extend_values(
                self.map_value(&value.text())
                    .into_iter()
                    .map(AttributeValue::String),
            );
        }
        Ok(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrflow_core::{AttributeMap, AttributeRequestContext};
    use std::sync::Arc;

    fn context(values: &[&str]) -> ResolutionContext {
        let ctx = ResolutionContext::new(AttributeRequestContext::new());
        let mut raw = AttributeMap::new();
        raw.insert(
            "affiliation".into(),
            Attribute::with_values("affiliation", values.iter().copied()),
        );
        ctx.record_data_connector("static", Arc::new(raw));
        ctx
    }

    fn config() -> DefinitionConfig {
        DefinitionConfig::new("eduPersonAffiliation")
            .depends_on("static")
            .with_source_attribute("affiliation")
    }

    fn strings(attribute: &Attribute) -> Vec<String> {
        attribute.values().iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_full_and_partial_matches() {
        let definition = MappedAttributeDefinition::new(
            config(),
            vec![
                ValueMap::new("member")
                    .with_source(SourceValue::new("faculty"))
                    .with_source(SourceValue::new("STAFF").ignore_case(true)),
                ValueMap::new("student-$1").with_source(SourceValue::new("stud-(\\w+)").partial_match(true)),
            ],
        )
        .unwrap();

        let ctx = context(&["faculty", "staff", "x stud-grad", "facultyx"]);
        let attribute = definition.resolve(&ctx).await.unwrap();

        assert_eq!(strings(&attribute), vec!["member", "member", "x student-grad"]);
    }

    #[tokio::test]
    async fn test_overlapping_maps_yield_each_result_once() {
        let definition = MappedAttributeDefinition::new(
            config(),
            vec![
                ValueMap::new("member").with_source(SourceValue::new("faculty")),
                ValueMap::new("member").with_source(SourceValue::new("fac.*")),
                ValueMap::new("${1}-emeritus").with_source(SourceValue::new("(fac)ulty")),
            ],
        )
        .unwrap();

        let attribute = definition.resolve(&context(&["faculty"])).await.unwrap();
        assert_eq!(attribute.values().len(), 2);
        assert_eq!(strings(&attribute), vec!["member", "fac-emeritus"]);
    }

    #[tokio::test]
    async fn test_default_and_pass_thru() {
        let maps = vec![ValueMap::new("member").with_source(SourceValue::new("staff"))];

        let with_default = MappedAttributeDefinition::new(config(), maps.clone())
            .unwrap()
            .with_default_value("affiliate");
        let attribute = with_default.resolve(&context(&["staff", "guest"])).await.unwrap();
        assert_eq!(strings(&attribute), vec!["member", "affiliate"]);

        let pass_thru = MappedAttributeDefinition::new(config(), maps.clone())
            .unwrap()
            .pass_thru(true);
        let attribute = pass_thru.resolve(&context(&["staff", "guest"])).await.unwrap();
        assert_eq!(strings(&attribute), vec!["member", "guest"]);

        let neither = MappedAttributeDefinition::new(config(), maps).unwrap();
        let attribute = neither.resolve(&context(&["guest", ""])).await.unwrap();
        assert!(attribute.is_empty());
    }

    #[tokio::test]
    async fn test_default_used_without_values() {
        let definition = MappedAttributeDefinition::new(config(), Vec::new())
            .unwrap()
            .with_default_value("affiliate");
        let attribute = definition.resolve(&context(&[])).await.unwrap();

        assert_eq!(strings(&attribute), vec!["affiliate"]);
    }

    #[tokio::test]
    async fn test_validate_rejects_pass_thru_with_default() {
        let definition = MappedAttributeDefinition::new(config(), Vec::new())
            .unwrap()
            .pass_thru(true)
            .with_default_value("affiliate");

        assert!(matches!(
            definition.validate().await,
            Err(ResolutionError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        let result = MappedAttributeDefinition::new(
            config(),
            vec![ValueMap::new("x").with_source(SourceValue::new("(unclosed"))],
        );
        assert!(matches!(result, Err(ResolutionError::InvalidConfiguration { .. })));
    }
}
