//! Principal connector for sealed transient identifiers

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::context::ResolutionContext;
use crate::definition::crypto_transient::TOKEN_SEPARATOR;
use crate::error::{MismatchKind, ResolutionError, Result};
use crate::plugin::{PluginConfig, PrincipalConnector, ResolutionPlugin};
use crate::sealer::DataSealer;

/// Recovers the principal from an identifier issued by
/// [`CryptoTransientIdDefinition`](crate::definition::CryptoTransientIdDefinition)
pub struct CryptoTransientIdPrincipalConnector {
    config: PluginConfig,
    format: String,
    relying_parties: HashSet<String>,
    sealer: Arc<dyn DataSealer>,
}

impl CryptoTransientIdPrincipalConnector {
    pub fn new(config: PluginConfig, format: impl Into<String>, sealer: Arc<dyn DataSealer>) -> Self {
        Self {
            config,
            format: format.into(),
            relying_parties: HashSet::new(),
            sealer,
        }
    }

    /// Restrict the connector to the given relying party
    pub fn with_relying_party(mut self, entity_id: impl Into<String>) -> Self {
        self.relying_parties.insert(entity_id.into());
        self
    }
}

/// Compare a decoded component with an optional qualifier; absent means unchecked
fn check(kind: MismatchKind, decoded: &str, expected: Option<&str>) -> Result<()> {
    match expected {
        Some(expected) if expected != decoded => Err(ResolutionError::TransientIdMismatch {
            kind,
            decoded: decoded.to_string(),
            expected: expected.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Compare a decoded component with a request field that must be present
fn check_required(
    kind: MismatchKind,
    field: &'static str,
    decoded: &str,
    expected: Option<&str>,
) -> Result<()> {
    let expected = expected.ok_or(ResolutionError::MissingRequestData(field))?;
    check(kind, decoded, Some(expected))
}

#[async_trait]
impl ResolutionPlugin for CryptoTransientIdPrincipalConnector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.dependency_ids
    }

    async fn validate(&self) -> Result<()> {
        if self.format.is_empty() {
            return Err(ResolutionError::invalid_config(self.id(), "name identifier format is required"));
        }
        Ok(())
    }
}

#[async_trait]
impl PrincipalConnector for CryptoTransientIdPrincipalConnector {
    fn format(&self) -> &str {
        &self.format
    }

    fn relying_parties(&self) -> &HashSet<String> {
        &self.relying_parties
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<String> {
        let request = ctx.request();
        let subject = request
            .subject_name_identifier
            .as_ref()
            .ok_or(ResolutionError::MissingRequestData("subject name identifier"))?;

        let decoded = self.sealer.unwrap(subject.value())?;
        let parts: Vec<&str> = decoded.split(TOKEN_SEPARATOR).collect();
        let [issuer, requester, principal] = parts.as_slice() else {
            return Err(ResolutionError::InvalidToken(format!(
                "expected 3 components, found {}",
                parts.len()
            )));
        };

        check(MismatchKind::NameQualifier, issuer, subject.name_qualifier())?;
        check(MismatchKind::SpNameQualifier, requester, subject.sp_name_qualifier())?;
        check_required(MismatchKind::Issuer, "issuer", issuer, request.issuer())?;
        check_required(MismatchKind::Requester, "requester", requester, request.requester())?;

        debug!("Principal connector '{}' decoded transient identifier", self.id());
        Ok(principal.to_string())
    }
}
