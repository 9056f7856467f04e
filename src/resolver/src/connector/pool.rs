//! Directory connection pooling strategies
//!
//! Two strategies are available:
//!
//! - [`UnpooledStrategy`]: a fresh connection per checkout, closed on checkin
//! - [`BoundedPoolStrategy`]: a bounded pool of reusable connections with
//!   blocking or soft-limit checkout, idle pruning and periodic validation
//!
//! A connection should be checked in after use whether or not the operation
//! on it succeeded. A pooled connection dropped without checkin (cancelled
//! request, timeout) gives its pool slot back but is not reused.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ldap::{LdapConnection, LdapConnectionFactory};
use crate::error::{ResolutionError, Result};

/// Bounded pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened when the pool starts
    pub min_pool_size: usize,

    /// Connections the pool hands out before checkout blocks or overflows
    pub max_pool_size: usize,

    /// Block checkout when the pool is exhausted; otherwise open an
    /// overflow connection that is closed on checkin
    pub block_when_empty: bool,

    /// Maximum time to block on checkout; unlimited when unset
    pub block_wait_time_ms: Option<u64>,

    /// Interval between validation/prune passes
    pub validate_period_secs: u64,

    /// Idle connections older than this are closed
    pub idle_time_secs: u64,
}

impl PoolConfig {
    pub fn block_wait_time(&self) -> Option<Duration> {
        self.block_wait_time_ms.map(Duration::from_millis)
    }

    pub fn validate_period(&self) -> Duration {
        Duration::from_secs(self.validate_period_secs.max(1))
    }

    pub fn idle_time(&self) -> Duration {
        Duration::from_secs(self.idle_time_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 0,
            max_pool_size: 10,
            block_when_empty: true,
            block_wait_time_ms: None,
            validate_period_secs: 30 * 60,
            idle_time_secs: 10 * 60,
        }
    }
}

/// A checked-out connection
pub struct PooledConnection {
    connection: Box<dyn LdapConnection>,
    /// Pool slot, released when the connection is checked in or dropped
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    pub fn connection(&mut self) -> &mut dyn LdapConnection {
        self.connection.as_mut()
    }
}

/// Hands out directory connections
#[async_trait]
pub trait LdapPoolStrategy: Send + Sync {
    async fn checkout(&self) -> Result<PooledConnection>;

    async fn checkin(&self, connection: PooledConnection);
}

/// Opens a connection per checkout and closes it on checkin
pub struct UnpooledStrategy {
    factory: Arc<dyn LdapConnectionFactory>,
}

impl UnpooledStrategy {
    pub fn new(factory: Arc<dyn LdapConnectionFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl LdapPoolStrategy for UnpooledStrategy {
    async fn checkout(&self) -> Result<PooledConnection> {
        Ok(PooledConnection {
            connection: self.factory.create().await?,
            permit: None,
        })
    }

    async fn checkin(&self, mut connection: PooledConnection) {
        connection.connection.close().await;
    }
}

struct IdleConnection {
    connection: Box<dyn LdapConnection>,
    idle_since: Instant,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub available_permits: usize,
    pub max_pool_size: usize,
}

/// Bounded, validating connection pool
pub struct BoundedPoolStrategy {
    factory: Arc<dyn LdapConnectionFactory>,
    config: PoolConfig,
    idle: Mutex<VecDeque<IdleConnection>>,
    permits: Arc<Semaphore>,
}

impl BoundedPoolStrategy {
    /// Create the pool and open `min_pool_size` connections
    pub async fn new(factory: Arc<dyn LdapConnectionFactory>, config: PoolConfig) -> Result<Self> {
        let pool = Self {
            factory,
            permits: Arc::new(Semaphore::new(config.max_pool_size)),
            idle: Mutex::new(VecDeque::new()),
            config,
        };

        for _ in 0..pool.config.min_pool_size.min(pool.config.max_pool_size) {
            let connection = pool.factory.create().await?;
            pool.idle.lock().push_back(IdleConnection {
                connection,
                idle_since: Instant::now(),
            });
        }

        info!(
            "Directory pool started with {} idle connections (max {})",
            pool.idle.lock().len(),
            pool.config.max_pool_size
        );
        Ok(pool)
    }

    /// Run validation and pruning every `validate_period` until the pool is dropped
    pub fn start_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let pool: Weak<Self> = Arc::downgrade(self);
        let period = self.config.validate_period();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                match pool.upgrade() {
                    Some(pool) => pool.validate_idle().await,
                    None => break,
                }
            }
        })
    }

    /// Close idle connections past their idle time and those failing validation
    pub async fn validate_idle(&self) {
        let idle_time = self.config.idle_time();
        let candidates: Vec<IdleConnection> = self.idle.lock().drain(..).collect();
        let mut kept = Vec::with_capacity(candidates.len());
        let mut closed = 0usize;

        for mut entry in candidates {
            let expired = entry.idle_since.elapsed() > idle_time;
            if expired || !entry.connection.is_valid().await {
                entry.connection.close().await;
                closed += 1;
            } else {
                kept.push(entry);
            }
        }

        if closed > 0 {
            debug!("Directory pool closed {} idle connections", closed);
        }
        self.idle.lock().extend(kept);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().len(),
            available_permits: self.permits.available_permits(),
            max_pool_size: self.config.max_pool_size,
        }
    }

    /// Take a pool slot; `None` means an overflow connection for a soft-limit pool
    async fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        if !self.config.block_when_empty {
            return Ok(match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    debug!("Directory pool exhausted, opening overflow connection");
                    None
                }
            });
        }

        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match self.config.block_wait_time() {
            Some(wait) => tokio::time::timeout(wait, acquire).await.map_err(|_| {
                ResolutionError::Directory(format!(
                    "no pooled connection available after {:?}",
                    wait
                ))
            })?,
            None => acquire.await,
        }
        .map_err(|e| ResolutionError::Directory(format!("directory pool closed: {}", e)))?;

        Ok(Some(permit))
    }
}

#[async_trait]
impl LdapPoolStrategy for BoundedPoolStrategy {
    async fn checkout(&self) -> Result<PooledConnection> {
        let permit = self.acquire_permit().await?;

        let reused = if permit.is_some() { self.idle.lock().pop_front() } else { None };
        let connection = match reused {
            Some(entry) => entry.connection,
            None => self.factory.create().await.map_err(|err| {
                warn!("Unable to open directory connection: {}", err);
                err
            })?,
        };

        Ok(PooledConnection { connection, permit })
    }

    async fn checkin(&self, connection: PooledConnection) {
        let PooledConnection { mut connection, permit } = connection;
        match permit {
            Some(permit) => {
                self.idle.lock().push_back(IdleConnection {
                    connection,
                    idle_since: Instant::now(),
                });
                drop(permit);
            }
            None => connection.close().await,
        }
    }
}

/// Build the configured strategy: pooled when a pool config is present
pub async fn pool_strategy(
    factory: Arc<dyn LdapConnectionFactory>,
    config: Option<&PoolConfig>,
) -> Result<Arc<dyn LdapPoolStrategy>> {
    match config {
        None => Ok(Arc::new(UnpooledStrategy::new(factory))),
        Some(config) => {
            let pool = Arc::new(BoundedPoolStrategy::new(factory, config.clone()).await?);
            pool.start_maintenance();
            Ok(pool)
        }
    }
}
