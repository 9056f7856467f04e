//! Resolve-then-filter facade

use std::sync::Arc;
use tracing::{debug, info};

use attrflow_core::{AttributeMap, AttributeRequestContext};
use attrflow_filter::AttributeFilteringEngine;
use attrflow_resolver::AttributeResolver;

use crate::error::Result;

/// Attribute authority combining a resolver and a filtering engine
///
/// Both services may be reloaded independently while the authority is in use.
pub struct AttributeAuthority {
    resolver: Arc<AttributeResolver>,
    filter: Arc<AttributeFilteringEngine>,
}

impl AttributeAuthority {
    pub fn new(resolver: Arc<AttributeResolver>, filter: Arc<AttributeFilteringEngine>) -> Self {
        info!(
            "Attribute authority using resolver '{}' and filter '{}'",
            resolver.id(),
            filter.id()
        );
        Self { resolver, filter }
    }

    pub fn resolver(&self) -> &Arc<AttributeResolver> {
        &self.resolver
    }

    pub fn filter(&self) -> &Arc<AttributeFilteringEngine> {
        &self.filter
    }

    /// Resolve the request's attributes without applying release policy
    pub async fn resolve_attributes(&self, request: &AttributeRequestContext) -> Result<AttributeMap> {
        Ok(self.resolver.resolve_attributes(request).await?)
    }

    /// Resolve and filter the attributes released to the requester
    pub async fn release_attributes(&self, request: &AttributeRequestContext) -> Result<AttributeMap> {
        let resolved = self.resolver.resolve_attributes(request).await?;
        let released = self.filter.filter_attributes(&resolved, request)?;
        debug!(
            "Released {} of {} resolved attributes to {:?}",
            released.len(),
            resolved.len(),
            request.requester()
        );
        Ok(released)
    }

    /// Map the request's subject identifier to a principal name
    pub async fn resolve_principal_name(&self, request: &AttributeRequestContext) -> Result<String> {
        Ok(self.resolver.resolve_principal_name(request).await?)
    }
}
