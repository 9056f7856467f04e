//! Directory (LDAP) data connector
//!
//! The connector renders its search filter template, consults the optional
//! result cache and otherwise searches through the configured pool strategy.
//! Only the first returned entry is turned into attributes.
//!
//! The wire client sits behind [`LdapConnection`] / [`LdapConnectionFactory`]
//! so deployments can plug in the directory client of their choice.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use attrflow_core::{Attribute, AttributeMap, AttributeValue};

use super::pool::LdapPoolStrategy;
use crate::cache::ResultCache;
use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};
use crate::plugin::{ConnectorConfig, DataConnector, ResolutionPlugin};
use crate::template::{CharacterEscapingStrategy, TemplateEngine};

/// Raw value of a directory attribute
#[derive(Debug, Clone, PartialEq)]
pub enum LdapValue {
    Text(String),
    Binary(Vec<u8>),
}

/// Entry returned by a directory search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LdapEntry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<LdapValue>>,
}

impl LdapEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_text(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .extend(values.iter().map(|v| LdapValue::Text(v.to_string())));
        self
    }

    pub fn with_binary(mut self, name: &str, value: Vec<u8>) -> Self {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .push(LdapValue::Binary(value));
        self
    }
}

/// One client connection to a directory
#[async_trait]
pub trait LdapConnection: Send {
    /// Establish (or re-establish) the connection
    async fn connect(&mut self) -> Result<()>;

    /// Search with `filter`, returning the listed attributes (all when empty)
    async fn search(&mut self, filter: &str, attributes: &[String]) -> Result<Vec<LdapEntry>>;

    /// Cheap liveness check used by pool maintenance
    async fn is_valid(&mut self) -> bool {
        true
    }

    async fn close(&mut self) {}
}

/// Opens directory connections
#[async_trait]
pub trait LdapConnectionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn LdapConnection>>;
}

/// Escapes values for inclusion in a search filter
///
/// Backslash is escaped first so that the escapes added for `*`, `(` and `)`
/// are not themselves doubled.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapValueEscaping;

impl CharacterEscapingStrategy for LdapValueEscaping {
    fn escape(&self, value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                '\\' => escaped.push_str("\\\\"),
                '*' => escaped.push_str("\\*"),
                '(' => escaped.push_str("\\("),
                ')' => escaped.push_str("\\)"),
                other => escaped.push(other),
            }
        }
        escaped
    }
}

/// Data connector backed by a directory search
pub struct LdapDataConnector {
    config: ConnectorConfig,
    template_name: String,
    template_engine: Arc<dyn TemplateEngine>,
    pool: Arc<dyn LdapPoolStrategy>,
    return_attributes: Vec<String>,
    no_results_is_error: bool,
    cache: Option<Arc<ResultCache>>,
}

impl LdapDataConnector {
    /// Create the connector and register its filter template
    pub fn new(
        config: ConnectorConfig,
        filter_template: &str,
        template_engine: Arc<dyn TemplateEngine>,
        pool: Arc<dyn LdapPoolStrategy>,
    ) -> Result<Self> {
        let template_name = format!("resolver.dc.{}", config.plugin.id);
        template_engine.register_template(&template_name, filter_template)?;

        Ok(Self {
            config,
            template_name,
            template_engine,
            pool,
            return_attributes: Vec::new(),
            no_results_is_error: false,
            cache: None,
        })
    }

    /// Attributes to request from the directory (all when empty)
    pub fn with_return_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn no_results_is_error(mut self, is_error: bool) -> Self {
        self.no_results_is_error = is_error;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn search(&self, filter: &str) -> Result<Vec<LdapEntry>> {
        let mut pooled = self.pool.checkout().await?;
        let result = pooled
            .connection()
            .search(filter, &self.return_attributes)
            .await;
        self.pool.checkin(pooled).await;

        result.map_err(|e| ResolutionError::connector(self.id(), format!("search '{}' failed: {}", filter, e)))
    }

    /// Convert the first entry; text values are trimmed and blanks dropped
    fn build_attributes(entry: &LdapEntry) -> AttributeMap {
        let mut attributes = AttributeMap::with_capacity(entry.attributes.len());
        for (name, values) in &entry.attributes {
            let mut attribute = Attribute::new(name.as_str());
            for value in values {
                match value {
                    LdapValue::Text(text) => {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            attribute.add_value(trimmed);
                        }
                    }
                    LdapValue::Binary(bytes) => attribute.add_value(AttributeValue::Bytes(bytes.clone())),
                }
            }
            attributes.insert(name.clone(), attribute);
        }
        attributes
    }
}

#[async_trait]
impl ResolutionPlugin for LdapDataConnector {
    fn id(&self) -> &str {
        &self.config.plugin.id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }

    /// Check out a connection, connect it and check it back in
    async fn validate(&self) -> Result<()> {
        let mut pooled = self.pool.checkout().await.map_err(|e| {
            ResolutionError::invalid_config(self.id(), format!("unable to obtain connection: {}", e))
        })?;
        let connected = pooled.connection().connect().await;
        self.pool.checkin(pooled).await;

        connected.map_err(|e| ResolutionError::invalid_config(self.id(), format!("unable to connect: {}", e)))
    }
}

#[async_trait]
impl DataConnector for LdapDataConnector {
    fn failover_dependency_id(&self) -> Option<&str> {
        self.config.failover_dependency_id.as_deref()
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<AttributeMap> {
        let filter = self
            .template_engine
            .create_statement(&self.template_name, ctx, self.dependency_ids(), &LdapValueEscaping)?
            .trim()
            .to_string();
        debug!("Data connector '{}' search filter: {}", self.id(), filter);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&filter) {
                debug!("Data connector '{}' served '{}' from cache", self.id(), filter);
                return Ok(cached);
            }
        }

        let entries = self.search(&filter).await?;
        if entries.is_empty() {
            if self.no_results_is_error {
                warn!("Data connector '{}' found no entries for '{}'", self.id(), filter);
                return Err(ResolutionError::NoResult(self.id().to_string()));
            }
            debug!("Data connector '{}' found no entries for '{}'", self.id(), filter);
        } else if entries.len() > 1 {
            debug!(
                "Data connector '{}' found {} entries, using '{}'",
                self.id(),
                entries.len(),
                entries[0].dn
            );
        }

        let attributes = entries.first().map(Self::build_attributes).unwrap_or_default();
        if let Some(cache) = &self.cache {
            cache.put(&filter, attributes.clone());
        }
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::connector::pool::UnpooledStrategy;
    use crate::template::SimpleTemplateEngine;
    use attrflow_core::AttributeRequestContext;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory stub keyed by exact filter
    struct MemoryDirectory {
        entries: HashMap<String, Vec<LdapEntry>>,
        searches: AtomicUsize,
        filters: Mutex<Vec<String>>,
        reachable: bool,
    }

    struct MemoryConnection {
        directory: Arc<MemoryDirectory>,
    }

    #[async_trait]
    impl LdapConnection for MemoryConnection {
        async fn connect(&mut self) -> Result<()> {
            if self.directory.reachable {
                Ok(())
            } else {
                Err(ResolutionError::Directory("connection refused".to_string()))
            }
        }

        async fn search(&mut self, filter: &str, _attributes: &[String]) -> Result<Vec<LdapEntry>> {
            self.connect().await?;
            self.directory.searches.fetch_add(1, Ordering::SeqCst);
            self.directory.filters.lock().push(filter.to_string());
            Ok(self.directory.entries.get(filter).cloned().unwrap_or_default())
        }
    }

    #[async_trait]
    impl LdapConnectionFactory for Arc<MemoryDirectory> {
        async fn create(&self) -> Result<Box<dyn LdapConnection>> {
            Ok(Box::new(MemoryConnection {
                directory: Arc::clone(self),
            }))
        }
    }

    fn directory(reachable: bool) -> Arc<MemoryDirectory> {
        let mut entries = HashMap::new();
        entries.insert(
            "(uid=jdoe)".to_string(),
            vec![
                LdapEntry::new("uid=jdoe,ou=people,dc=example,dc=org")
                    .with_text("mail", &[" jdoe@example.org ", "   "])
                    .with_text("cn", &["John Doe"])
                    .with_binary("jpegPhoto", vec![0xff, 0xd8]),
                LdapEntry::new("uid=jdoe,ou=retired,dc=example,dc=org").with_text("mail", &["old@example.org"]),
            ],
        );
        Arc::new(MemoryDirectory {
            entries,
            searches: AtomicUsize::new(0),
            filters: Mutex::new(Vec::new()),
            reachable,
        })
    }

    fn connector(directory: &Arc<MemoryDirectory>) -> LdapDataConnector {
        let factory: Arc<dyn LdapConnectionFactory> = Arc::new(Arc::clone(directory));
        LdapDataConnector::new(
            ConnectorConfig::new("directory"),
            "  (uid={{requestContext.principalName}})  ",
            Arc::new(SimpleTemplateEngine::new()),
            Arc::new(UnpooledStrategy::new(factory)),
        )
        .unwrap()
    }

    fn ctx(principal: &str) -> ResolutionContext {
        ResolutionContext::new(AttributeRequestContext::new().with_principal(principal))
    }

    #[test]
    fn test_filter_escaping() {
        let escaping = LdapValueEscaping;
        assert_eq!(escaping.escape("a*b"), "a\\*b");
        assert_eq!(escaping.escape("(x)"), "\\(x\\)");
        assert_eq!(escaping.escape("a\\*"), "a\\\\\\*");
    }

    #[tokio::test]
    async fn test_first_entry_only_with_trimmed_values() {
        let directory = directory(true);
        let attributes = connector(&directory).resolve(&ctx("jdoe")).await.unwrap();

        assert_eq!(attributes["mail"].values(), &[AttributeValue::from("jdoe@example.org")]);
        assert_eq!(attributes["cn"].values(), &[AttributeValue::from("John Doe")]);
        assert_eq!(attributes["jpegPhoto"].values(), &[AttributeValue::Bytes(vec![0xff, 0xd8])]);
        assert_eq!(directory.filters.lock()[0], "(uid=jdoe)");
    }

    #[tokio::test]
    async fn test_principal_is_escaped_in_filter() {
        let directory = directory(true);
        let attributes = connector(&directory).resolve(&ctx("*)(uid=*")).await.unwrap();

        assert!(attributes.is_empty());
        assert_eq!(directory.filters.lock()[0], "(uid=\\*\\)\\(uid=\\*)");
    }

    #[tokio::test]
    async fn test_no_results_is_error() {
        let directory = directory(true);
        let connector = connector(&directory).no_results_is_error(true);

        let err = connector.resolve(&ctx("nobody")).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoResult(id) if id == "directory"));
    }

    #[tokio::test]
    async fn test_cache_skips_second_search() {
        let directory = directory(true);
        let connector = connector(&directory).with_cache(Arc::new(ResultCache::new(CacheConfig::default())));

        let first = connector.resolve(&ctx("jdoe")).await.unwrap();
        let second = connector.resolve(&ctx("jdoe")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(directory.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validate_reports_unreachable_directory() {
        assert!(connector(&directory(true)).validate().await.is_ok());

        let err = connector(&directory(false)).validate().await.unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidConfiguration { .. }));
    }
}
