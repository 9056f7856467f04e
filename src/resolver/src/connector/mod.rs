//! Data connectors
//!
//! Connectors pull raw attributes from a source (static configuration, a
//! directory or a relational database) for the attribute definitions to
//! build on.

pub mod ldap;
pub mod pool;
pub mod rdbms;
pub mod static_data;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use ldap::{LdapConnection, LdapConnectionFactory, LdapDataConnector, LdapEntry, LdapValue, LdapValueEscaping};
pub use pool::{pool_strategy, BoundedPoolStrategy, LdapPoolStrategy, PoolConfig, PoolStats, PooledConnection, UnpooledStrategy};
pub use rdbms::{
    ColumnDescriptor, ColumnType, QueryOptions, RdbmsDataConnector, SqlDataSource, SqlRow, SqlValue, SqlValueEscaping,
};
pub use static_data::StaticDataConnector;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresDataSource, PostgresPoolConfig};
