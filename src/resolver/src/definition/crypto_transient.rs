//! Sealed transient identifier definition

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use attrflow_core::Attribute;

use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};
use crate::plugin::{AttributeDefinition, DefinitionConfig, ResolutionPlugin};
use crate::sealer::DataSealer;

/// Default identifier lifetime: 4 hours
pub const DEFAULT_ID_LIFETIME: Duration = Duration::from_secs(4 * 60 * 60);

/// Separator between the sealed issuer, requester and principal
pub(crate) const TOKEN_SEPARATOR: char = '!';

/// Produces an opaque, expiring identifier bound to issuer, requester and
/// principal
pub struct CryptoTransientIdDefinition {
    config: DefinitionConfig,
    sealer: Arc<dyn DataSealer>,
    id_lifetime: Duration,
}

impl CryptoTransientIdDefinition {
    pub fn new(config: DefinitionConfig, sealer: Arc<dyn DataSealer>) -> Self {
        Self {
            config,
            sealer,
            id_lifetime: DEFAULT_ID_LIFETIME,
        }
    }

    pub fn with_id_lifetime(mut self, id_lifetime: Duration) -> Self {
        self.id_lifetime = id_lifetime;
        self
    }
}

#[async_trait]
impl ResolutionPlugin for CryptoTransientIdDefinition {
    fn id(&self) -> &str {
        self.config.id()
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }

    async fn validate(&self) -> Result<()> {
        if self.id_lifetime.is_zero() {
            return Err(ResolutionError::invalid_config(self.id(), "identifier lifetime must be positive"));
        }
        Ok(())
    }
}

#[async_trait]
impl AttributeDefinition for CryptoTransientIdDefinition {
    fn is_dependency_only(&self) -> bool {
        self.config.dependency_only
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<Attribute> {
        let request = ctx.request();
        let issuer = request.issuer().ok_or(ResolutionError::MissingRequestData("issuer"))?;
        let requester = request
            .requester()
            .ok_or(ResolutionError::MissingRequestData("requester"))?;
        let principal = request
            .principal_name
            .as_deref()
            .ok_or(ResolutionError::MissingRequestData("principal name"))?;

        let plaintext = format!(
            "{issuer}{sep}{requester}{sep}{principal}",
            sep = TOKEN_SEPARATOR
        );
        let lifetime_ms = i64::try_from(self.id_lifetime.as_millis()).unwrap_or(i64::MAX);
        let expiry = chrono::Utc::now().timestamp_millis().saturating_add(lifetime_ms);

        let sealed = self
            .sealer
            .wrap(&plaintext, expiry)
            .map_err(|e| ResolutionError::definition(self.id(), format!("unable to seal identifier: {}", e)))?;

        let mut attribute = Attribute::new(self.id());
        attribute.add_value(sealed);
        Ok(attribute)
    }
}
