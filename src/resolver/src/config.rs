//! Resolver settings
//!
//! Plugin graphs are assembled in code; this file only carries the tunables
//! shared by the connectors and the transient identifier plugins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::connector::pool::PoolConfig;

/// Top-level resolver configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub ldap_pool: PoolConfig,

    #[serde(default)]
    pub rdbms: RdbmsConfig,

    #[serde(default)]
    pub transient_id: TransientIdConfig,
}

/// Relational connector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdbmsConfig {
    /// Per-query timeout; unlimited when unset
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub read_only_connection: bool,

    #[serde(default)]
    pub uses_stored_procedure: bool,
}

impl RdbmsConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RdbmsConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: None,
            read_only_connection: true,
            uses_stored_procedure: false,
        }
    }
}

/// Transient identifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientIdConfig {
    #[serde(default = "default_id_lifetime")]
    pub lifetime_ms: u64,
}

impl TransientIdConfig {
    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }
}

impl Default for TransientIdConfig {
    fn default() -> Self {
        Self {
            lifetime_ms: default_id_lifetime(),
        }
    }
}

fn default_true() -> bool { true }
fn default_id_lifetime() -> u64 { 4 * 60 * 60 * 1000 }

impl ResolverConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ResolverConfig = toml::from_str(contents)
            .context("Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ldap_pool.max_pool_size == 0 {
            anyhow::bail!("LDAP pool max_pool_size must be at least 1");
        }

        if self.ldap_pool.min_pool_size > self.ldap_pool.max_pool_size {
            anyhow::bail!("LDAP pool min_pool_size cannot exceed max_pool_size");
        }

        if self.cache.capacity > 0 && self.cache.ttl_secs == 0 {
            anyhow::bail!("Cache ttl_secs must be positive when caching is enabled");
        }

        if self.transient_id.lifetime_ms == 0 {
            anyhow::bail!("Transient identifier lifetime must be positive");
        }

        Ok(())
    }
}
