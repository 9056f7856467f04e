//! Resolution plugin contracts
//!
//! Every unit of resolution work is a plugin with an id and a list of
//! dependency ids. Data connectors pull attributes from an external source,
//! attribute definitions derive one attribute from their dependencies and
//! principal connectors map a subject identifier back to a principal name.
//!
//! Plugins are shared across concurrent requests and must not mutate their
//! own state while resolving.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use attrflow_core::{Attribute, AttributeMap};

use crate::context::ResolutionContext;
use crate::error::Result;

/// Identity and dependencies common to all plugins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub id: String,
    #[serde(default)]
    pub dependency_ids: Vec<String>,
}

impl PluginConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dependency_ids: Vec::new(),
        }
    }

    /// Add a dependency, ignoring repeats
    pub fn depends_on(mut self, dependency_id: impl Into<String>) -> Self {
        let dependency_id = dependency_id.into();
        if !self.dependency_ids.contains(&dependency_id) {
            self.dependency_ids.push(dependency_id);
        }
        self
    }
}

/// Settings shared by data connectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(flatten)]
    pub plugin: PluginConfig,

    /// Connector consulted when this one fails
    #[serde(default)]
    pub failover_dependency_id: Option<String>,
}

impl ConnectorConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            plugin: PluginConfig::new(id),
            failover_dependency_id: None,
        }
    }

    pub fn depends_on(mut self, dependency_id: impl Into<String>) -> Self {
        self.plugin = self.plugin.depends_on(dependency_id);
        self
    }

    pub fn with_failover(mut self, connector_id: impl Into<String>) -> Self {
        self.failover_dependency_id = Some(connector_id.into());
        self
    }
}

/// Settings shared by attribute definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionConfig {
    #[serde(flatten)]
    pub plugin: PluginConfig,

    /// Attribute read from connector dependencies; defaults to the definition id
    #[serde(default)]
    pub source_attribute_id: Option<String>,

    /// Resolved only to feed other plugins, never released
    #[serde(default)]
    pub dependency_only: bool,
}

impl DefinitionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            plugin: PluginConfig::new(id),
            source_attribute_id: None,
            dependency_only: false,
        }
    }

    pub fn depends_on(mut self, dependency_id: impl Into<String>) -> Self {
        self.plugin = self.plugin.depends_on(dependency_id);
        self
    }

    pub fn with_source_attribute(mut self, attribute_id: impl Into<String>) -> Self {
        self.source_attribute_id = Some(attribute_id.into());
        self
    }

    pub fn dependency_only(mut self, dependency_only: bool) -> Self {
        self.dependency_only = dependency_only;
        self
    }

    pub fn id(&self) -> &str {
        &self.plugin.id
    }

    pub fn source_attribute_id(&self) -> &str {
        self.source_attribute_id.as_deref().unwrap_or(&self.plugin.id)
    }

    /// Values of the source attribute gathered from all dependencies
    pub fn dependency_values(&self, ctx: &ResolutionContext) -> Vec<attrflow_core::AttributeValue> {
        ctx.dependency_values(&self.plugin.dependency_ids, self.source_attribute_id())
    }
}

/// Base contract of every resolution plugin
#[async_trait]
pub trait ResolutionPlugin: Send + Sync {
    /// Unique id within a resolver
    fn id(&self) -> &str;

    /// Ids of the connectors and definitions this plugin reads from
    fn dependency_ids(&self) -> &[String];

    /// Check the plugin's own static configuration
    ///
    /// Never consults dependencies. Connectors may test connectivity.
    async fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Produces a set of attributes from an external source
#[async_trait]
pub trait DataConnector: ResolutionPlugin {
    /// Connector to resolve instead when this one fails
    fn failover_dependency_id(&self) -> Option<&str> {
        None
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<AttributeMap>;
}

/// Derives a single attribute from the values of its dependencies
#[async_trait]
pub trait AttributeDefinition: ResolutionPlugin {
    /// Dependency-only attributes are dropped from the released set
    fn is_dependency_only(&self) -> bool {
        false
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute>;
}

/// Maps a subject identifier of a given format to a principal name
#[async_trait]
pub trait PrincipalConnector: ResolutionPlugin {
    /// Name identifier format this connector understands
    fn format(&self) -> &str;

    /// Relying parties served by this connector; empty means all
    fn relying_parties(&self) -> &HashSet<String>;

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<String>;
}
