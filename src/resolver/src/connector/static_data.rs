//! Connector returning a fixed set of attributes

use async_trait::async_trait;

use attrflow_core::{Attribute, AttributeMap, AttributeValue};

use crate::context::ResolutionContext;
use crate::error::Result;
use crate::plugin::{ConnectorConfig, DataConnector, ResolutionPlugin};

/// Data connector with statically configured attributes
///
/// Typically used as the failover of a directory or database connector.
pub struct StaticDataConnector {
    config: ConnectorConfig,
    attributes: AttributeMap,
}

impl StaticDataConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            attributes: AttributeMap::new(),
        }
    }

    /// Add a static attribute, appending to any values already configured
    pub fn with_attribute<I, V>(mut self, id: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        self.attributes
            .entry(id.to_string())
            .or_insert_with(|| Attribute::new(id))
            .extend_values(values.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl ResolutionPlugin for StaticDataConnector {
    fn id(&self) -> &str {
        &self.config.plugin.id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }
}

#[async_trait]
impl DataConnector for StaticDataConnector {
    fn failover_dependency_id(&self) -> Option<&str> {
        self.config.failover_dependency_id.as_deref()
    }

    async fn resolve(&self, _ctx: &ResolutionContext) -> Result<AttributeMap> {
        Ok(self.attributes.clone())
    }
}
