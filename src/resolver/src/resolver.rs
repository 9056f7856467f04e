//! Attribute resolver
//!
//! Orchestrates dependency-ordered resolution of attribute definitions and
//! data connectors for one request, with data connector failover, per-request
//! memoization and post-resolution cleanup.
//!
//! # Architecture
//!
//! ```text
//! request → definitions ─┬→ definitions ─→ ...
//!                        └→ data connectors ─(error)→ failover connector
//!                                    ↓
//!                        [ResolutionContext memo]
//!                                    ↓
//!              cleanup (dependency-only, empty, duplicate values)
//! ```
//!
//! The plugin registry is an immutable snapshot behind an async read/write
//! lock. Resolutions hold the read lock for their whole dependency walk; a
//! reload validates the replacement first and only then takes the write lock.

use futures::future::{BoxFuture, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use attrflow_core::{Attribute, AttributeMap, AttributeRequestContext, UNSPECIFIED_NAME_ID_FORMAT};

use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result, ServiceError};
use crate::graph::{DependencyGraph, GraphError};
use crate::plugin::{AttributeDefinition, DataConnector, PrincipalConnector};

/// Registered plugins of one resolver configuration
///
/// Connector and definition ids share one namespace since dependency lists
/// may name either.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    data_connectors: HashMap<String, Arc<dyn DataConnector>>,
    attribute_definitions: HashMap<String, Arc<dyn AttributeDefinition>>,
    principal_connectors: Vec<Arc<dyn PrincipalConnector>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unique(&self, id: &str) -> Result<()> {
        if self.data_connectors.contains_key(id) || self.attribute_definitions.contains_key(id) {
            return Err(ResolutionError::DuplicatePlugin(id.to_string()));
        }
        Ok(())
    }

    pub fn add_data_connector(&mut self, connector: Arc<dyn DataConnector>) -> Result<()> {
        self.ensure_unique(connector.id())?;
        self.data_connectors.insert(connector.id().to_string(), connector);
        Ok(())
    }

    pub fn add_attribute_definition(&mut self, definition: Arc<dyn AttributeDefinition>) -> Result<()> {
        self.ensure_unique(definition.id())?;
        self.attribute_definitions
            .insert(definition.id().to_string(), definition);
        Ok(())
    }

    /// Register a principal connector; registration order is kept
    pub fn add_principal_connector(&mut self, connector: Arc<dyn PrincipalConnector>) -> Result<()> {
        if self.principal_connectors.iter().any(|c| c.id() == connector.id()) {
            return Err(ResolutionError::DuplicatePlugin(connector.id().to_string()));
        }
        self.principal_connectors.push(connector);
        Ok(())
    }

    pub fn with_data_connector(mut self, connector: Arc<dyn DataConnector>) -> Result<Self> {
        self.add_data_connector(connector)?;
        Ok(self)
    }

    pub fn with_attribute_definition(mut self, definition: Arc<dyn AttributeDefinition>) -> Result<Self> {
        self.add_attribute_definition(definition)?;
        Ok(self)
    }

    pub fn with_principal_connector(mut self, connector: Arc<dyn PrincipalConnector>) -> Result<Self> {
        self.add_principal_connector(connector)?;
        Ok(self)
    }

    pub fn data_connector(&self, id: &str) -> Option<&Arc<dyn DataConnector>> {
        self.data_connectors.get(id)
    }

    pub fn attribute_definition(&self, id: &str) -> Option<&Arc<dyn AttributeDefinition>> {
        self.attribute_definitions.get(id)
    }

    pub fn principal_connectors(&self) -> &[Arc<dyn PrincipalConnector>] {
        &self.principal_connectors
    }

    pub fn attribute_definition_ids(&self) -> Vec<String> {
        self.attribute_definitions.keys().cloned().collect()
    }

    pub fn data_connector_ids(&self) -> Vec<String> {
        self.data_connectors.keys().cloned().collect()
    }

    /// Static dependency graph over connectors and definitions
    ///
    /// Failover links count as dependencies of the failing connector.
    pub fn dependency_graph(&self) -> std::result::Result<DependencyGraph, GraphError> {
        let mut graph = DependencyGraph::new();
        for (id, connector) in &self.data_connectors {
            let mut dependencies = connector.dependency_ids().to_vec();
            if let Some(failover) = connector.failover_dependency_id() {
                dependencies.push(failover.to_string());
            }
            graph.add_plugin(id, dependencies)?;
        }
        for (id, definition) in &self.attribute_definitions {
            graph.add_plugin(id, definition.dependency_ids().iter().cloned())?;
        }
        graph.link();
        Ok(graph)
    }

    /// Pick the principal connector for a subject format and requester
    ///
    /// A connector listing the requester always beats a wildcard connector
    /// (empty relying-party set). Among equals the first registered wins.
    pub fn select_principal_connector(
        &self,
        format: &str,
        requester: Option<&str>,
    ) -> Option<&Arc<dyn PrincipalConnector>> {
        let mut wildcard = None;
        for connector in &self.principal_connectors {
            if connector.format() != format {
                continue;
            }
            let relying_parties = connector.relying_parties();
            if relying_parties.is_empty() {
                wildcard = wildcard.or(Some(connector));
            } else if requester.map_or(false, |rp| relying_parties.contains(rp)) {
                return Some(connector);
            }
        }
        wildcard
    }

    /// Validate every plugin
    ///
    /// An invalid data connector is tolerated when its failover chain reaches
    /// a valid connector. Dependency cycles are rejected.
    pub async fn validate(&self) -> Result<()> {
        if let Err(GraphError::CircularDependency(path)) =
            self.dependency_graph().and_then(|graph| graph.resolve_order())
        {
            return Err(ResolutionError::CircularDependency(path));
        }

        for connector in self.data_connectors.values() {
            self.validate_data_connector(connector).await?;
        }

        for definition in self.attribute_definitions.values() {
            definition.validate().await.map_err(|e| {
                error!("Attribute definition '{}' failed validation: {}", definition.id(), e);
                e
            })?;
        }

        for connector in &self.principal_connectors {
            connector.validate().await.map_err(|e| {
                error!("Principal connector '{}' failed validation: {}", connector.id(), e);
                e
            })?;
        }

        Ok(())
    }

    async fn validate_data_connector(&self, connector: &Arc<dyn DataConnector>) -> Result<()> {
        let mut current = Arc::clone(connector);
        let mut visited: HashSet<String> = HashSet::from([current.id().to_string()]);

        loop {
            let err = match current.validate().await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let Some(failover_id) = current.failover_dependency_id().map(str::to_string) else {
                error!("Data connector '{}' failed validation: {}", current.id(), err);
                return Err(err);
            };
            if !visited.insert(failover_id.clone()) {
                return Err(ResolutionError::CircularDependency(format!(
                    "failover chain of '{}' revisits '{}'",
                    connector.id(),
                    failover_id
                )));
            }

            warn!(
                "Data connector '{}' failed validation, checking failover '{}': {}",
                current.id(),
                failover_id,
                err
            );
            current = self
                .data_connectors
                .get(&failover_id)
                .cloned()
                .ok_or(ResolutionError::UnknownDataConnector(failover_id))?;
        }
    }
}

/// Resolve one attribute definition, memoized in `ctx`
///
/// A definition id with no registered definition yields `None`.
fn resolve_definition<'a>(
    registry: &'a PluginRegistry,
    ctx: &'a ResolutionContext,
    id: &'a str,
) -> BoxFuture<'a, Result<Option<Arc<Attribute>>>> {
    async move {
        if let Some(attribute) = ctx.resolved_attribute_definition(id) {
            return Ok(Some(attribute));
        }

        let Some(definition) = registry.attribute_definition(id) else {
            warn!("Requested attribute '{}' has no attribute definition", id);
            return Ok(None);
        };

        ctx.enter(id)?;
        let outcome = match resolve_dependencies(registry, ctx, definition.dependency_ids()).await {
            Ok(()) => definition.resolve(ctx).await,
            Err(err) => Err(err),
        };
        ctx.exit(id);

        let attribute = Arc::new(outcome?);
        debug!("Resolved attribute '{}' with {} values", id, attribute.len());
        ctx.record_attribute_definition(id, Arc::clone(&attribute));
        Ok(Some(attribute))
    }
    .boxed()
}

/// Resolve one data connector, memoized in `ctx`, failing over on error
fn resolve_connector<'a>(
    registry: &'a PluginRegistry,
    ctx: &'a ResolutionContext,
    id: &'a str,
) -> BoxFuture<'a, Result<Arc<AttributeMap>>> {
    async move {
        if let Some(attributes) = ctx.resolved_data_connector(id) {
            return Ok(attributes);
        }

        let connector = registry
            .data_connector(id)
            .ok_or_else(|| ResolutionError::UnknownDataConnector(id.to_string()))?;

        // `id` stays in progress until its failover chain settles
        ctx.enter(id)?;
        let outcome = resolve_with_failover(registry, ctx, id, connector.as_ref()).await;
        ctx.exit(id);
        let attributes = outcome?;

        debug!("Resolved data connector '{}' with {} attributes", id, attributes.len());
        ctx.record_data_connector(id, Arc::clone(&attributes));
        Ok(attributes)
    }
    .boxed()
}

async fn resolve_with_failover(
    registry: &PluginRegistry,
    ctx: &ResolutionContext,
    id: &str,
    connector: &dyn DataConnector,
) -> Result<Arc<AttributeMap>> {
    resolve_dependencies(registry, ctx, connector.dependency_ids()).await?;
    match connector.resolve(ctx).await {
        Ok(attributes) => Ok(Arc::new(attributes)),
        Err(err) => match connector.failover_dependency_id() {
            Some(failover_id) => {
                warn!(
                    "Data connector '{}' failed, invoking failover '{}': {}",
                    id, failover_id, err
                );
                resolve_connector(registry, ctx, failover_id).await
            }
            None => {
                error!("Data connector '{}' failed with no failover: {}", id, err);
                Err(err)
            }
        },
    }
}

/// Resolve dependencies: connectors first, then definitions; unknown ids are skipped
async fn resolve_dependencies(
    registry: &PluginRegistry,
    ctx: &ResolutionContext,
    dependency_ids: &[String],
) -> Result<()> {
    for dependency_id in dependency_ids {
        if registry.data_connector(dependency_id).is_some() {
            resolve_connector(registry, ctx, dependency_id).await?;
        } else if registry.attribute_definition(dependency_id).is_some() {
            resolve_definition(registry, ctx, dependency_id).await?;
        } else {
            debug!("Ignoring unknown dependency '{}'", dependency_id);
        }
    }
    Ok(())
}

/// Attribute resolver service
pub struct AttributeResolver {
    id: String,
    registry: RwLock<PluginRegistry>,
}

impl AttributeResolver {
    /// Create a resolver over a registry without validating it
    pub fn new(id: impl Into<String>, registry: PluginRegistry) -> Self {
        Self {
            id: id.into(),
            registry: RwLock::new(registry),
        }
    }

    /// Create a resolver after validating the registry
    pub async fn with_validated_registry(
        id: impl Into<String>,
        registry: PluginRegistry,
    ) -> std::result::Result<Self, ServiceError> {
        let id = id.into();
        registry
            .validate()
            .await
            .map_err(|source| ServiceError::InvalidConfiguration {
                service: id.clone(),
                source,
            })?;
        info!("Attribute resolver '{}' initialized", id);
        Ok(Self::new(id, registry))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolve the requested attributes (all definitions if none requested)
    ///
    /// Fails if any required plugin fails with no usable failover; no partial
    /// result is returned.
    pub async fn resolve_attributes(&self, request: &AttributeRequestContext) -> Result<AttributeMap> {
        let ctx = ResolutionContext::new(request.clone());
        self.resolve_attributes_in(&ctx).await
    }

    /// Resolve the context's requested attributes, leaving the memo in `ctx`
    pub async fn resolve_attributes_in(&self, ctx: &ResolutionContext) -> Result<AttributeMap> {
        let registry = self.registry.read().await;
        if registry.attribute_definitions.is_empty() {
            debug!("No attribute definitions loaded in '{}', nothing to resolve", self.id);
            return Ok(AttributeMap::new());
        }

        let requested = &ctx.request().requested_attribute_ids;
        let attribute_ids = if requested.is_empty() {
            registry.attribute_definition_ids()
        } else {
            requested.clone()
        };
        debug!(
            "Resolving attributes {:?} for principal {:?}",
            attribute_ids,
            ctx.request().principal_name
        );

        let mut resolved = Vec::with_capacity(attribute_ids.len());
        for attribute_id in &attribute_ids {
            let attribute = resolve_definition(&registry, ctx, attribute_id).await?;
            resolved.push((attribute_id.clone(), attribute));
        }

        Ok(Self::clean_resolved_attributes(&registry, resolved))
    }

    /// Resolve a single attribute definition within `ctx`
    pub async fn resolve_attribute(
        &self,
        ctx: &ResolutionContext,
        attribute_id: &str,
    ) -> Result<Option<Arc<Attribute>>> {
        let registry = self.registry.read().await;
        resolve_definition(&registry, ctx, attribute_id).await
    }

    /// Resolve a single data connector within `ctx`
    pub async fn resolve_data_connector(
        &self,
        ctx: &ResolutionContext,
        connector_id: &str,
    ) -> Result<Arc<AttributeMap>> {
        let registry = self.registry.read().await;
        resolve_connector(&registry, ctx, connector_id).await
    }

    /// Map the request's subject identifier to a principal name
    pub async fn resolve_principal_name(&self, request: &AttributeRequestContext) -> Result<String> {
        let registry = self.registry.read().await;
        let format = request
            .subject_name_identifier
            .as_ref()
            .map(|subject| subject.format())
            .unwrap_or(UNSPECIFIED_NAME_ID_FORMAT);
        let requester = request.requester();

        let connector = registry
            .select_principal_connector(format, requester)
            .ok_or_else(|| ResolutionError::NoPrincipalConnector {
                format: format.to_string(),
                relying_party: requester.unwrap_or_default().to_string(),
            })?;
        debug!(
            "Using principal connector '{}' for format '{}' and requester {:?}",
            connector.id(),
            format,
            requester
        );

        let ctx = ResolutionContext::new(request.clone());
        resolve_dependencies(&registry, &ctx, connector.dependency_ids()).await?;
        connector.resolve(&ctx).await
    }

    /// Validate the active configuration
    pub async fn validate(&self) -> Result<()> {
        self.registry.read().await.validate().await
    }

    /// Replace the plugin configuration
    ///
    /// The new registry is validated before it becomes visible. On failure the
    /// current configuration stays active and a service error is returned.
    pub async fn reload(&self, registry: PluginRegistry) -> std::result::Result<(), ServiceError> {
        if let Err(source) = registry.validate().await {
            error!("{} configuration is not valid, retaining old configuration: {}", self.id, source);
            return Err(ServiceError::InvalidConfiguration {
                service: self.id.clone(),
                source,
            });
        }

        let mut current = self.registry.write().await;
        *current = registry;
        info!(
            "Attribute resolver '{}' loaded {} connectors, {} definitions, {} principal connectors",
            self.id,
            current.data_connectors.len(),
            current.attribute_definitions.len(),
            current.principal_connectors.len()
        );
        Ok(())
    }

    /// Topological plugin order of the active configuration
    pub async fn resolution_order(&self) -> Result<Vec<String>> {
        let registry = self.registry.read().await;
        registry
            .dependency_graph()
            .and_then(|graph| graph.resolve_order())
            .map_err(|e| match e {
                GraphError::CircularDependency(path) => ResolutionError::CircularDependency(path),
                GraphError::DuplicatePlugin(id) => ResolutionError::DuplicatePlugin(id),
            })
    }

    /// Drop unresolved, dependency-only and empty attributes; dedupe values
    fn clean_resolved_attributes(
        registry: &PluginRegistry,
        resolved: Vec<(String, Option<Arc<Attribute>>)>,
    ) -> AttributeMap {
        let mut cleaned = AttributeMap::with_capacity(resolved.len());
        for (id, attribute) in resolved {
            let Some(attribute) = attribute else {
                continue;
            };

            if registry
                .attribute_definition(&id)
                .map_or(false, |definition| definition.is_dependency_only())
            {
                debug!("Removing dependency-only attribute '{}'", id);
                continue;
            }

            if attribute.is_empty() {
                debug!("Removing attribute '{}' with no values", id);
                continue;
            }

            let mut attribute = Attribute::clone(&attribute);
            let removed = attribute.dedup_values();
            if removed > 0 {
                debug!("Removed {} duplicate values from '{}'", removed, id);
            }
            cleaned.insert(id, attribute);
        }
        cleaned
    }
}
