//! # Attrflow Attribute Resolver
//!
//! Dependency-ordered attribute resolution for a SAML identity provider.
//!
//! ## Features
//!
//! - **Plugin graph** of data connectors and attribute definitions with
//!   per-request memoization and runtime cycle detection
//! - **Failover** between data connectors
//! - **Directory and relational connectors** with statement templates,
//!   pooling and a TTL result cache
//! - **Transient identifiers** sealed with AES-256-GCM and resolved back to
//!   the principal by a paired principal connector
//! - **Hot reload** of the plugin registry, rejected when invalid
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use attrflow_core::AttributeRequestContext;
//! use attrflow_resolver::{
//!     AttributeResolver, ConnectorConfig, DefinitionConfig, PluginRegistry,
//!     SimpleAttributeDefinition, StaticDataConnector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = PluginRegistry::new()
//!         .with_data_connector(Arc::new(
//!             StaticDataConnector::new(ConnectorConfig::new("static"))
//!                 .with_attribute("mail", ["jdoe@example.org"]),
//!         ))?
//!         .with_attribute_definition(Arc::new(SimpleAttributeDefinition::new(
//!             DefinitionConfig::new("mail").depends_on("static"),
//!         )))?;
//!
//!     let resolver = AttributeResolver::with_validated_registry("resolver", registry).await?;
//!     let attributes = resolver
//!         .resolve_attributes(&AttributeRequestContext::new().with_principal("jdoe"))
//!         .await?;
//!
//!     println!("released {} attributes", attributes.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connector;
pub mod context;
pub mod definition;
pub mod error;
pub mod graph;
pub mod plugin;
pub mod principal;
pub mod resolver;
pub mod sealer;
pub mod template;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use config::{RdbmsConfig, ResolverConfig, TransientIdConfig};
pub use connector::{LdapDataConnector, RdbmsDataConnector, StaticDataConnector};
pub use context::{ResolutionContext, ResolvedPlugin};
pub use definition::{
    CryptoTransientIdDefinition, MappedAttributeDefinition, PrescopedAttributeDefinition, RegexSplitDefinition,
    Saml2NameIdDefinition, SimpleAttributeDefinition, SourceValue, ValueMap,
};
pub use error::{MismatchKind, ResolutionError, Result, ServiceError};
pub use graph::{DependencyGraph, GraphError};
pub use plugin::{
    AttributeDefinition, ConnectorConfig, DataConnector, DefinitionConfig, PluginConfig, PrincipalConnector,
    ResolutionPlugin,
};
pub use principal::CryptoTransientIdPrincipalConnector;
pub use resolver::{AttributeResolver, PluginRegistry};
pub use sealer::{AesGcmDataSealer, DataSealer, SealerError};
pub use template::{CharacterEscapingStrategy, NoEscaping, SimpleTemplateEngine, TemplateEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
