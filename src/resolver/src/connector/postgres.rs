//! PostgreSQL data source for the relational connector

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use std::time::Duration;
use tracing::info;

use super::rdbms::{QueryOptions, SqlDataSource, SqlRow, SqlValue};
use crate::error::{ResolutionError, Result};

/// Pool sizing for [`PostgresDataSource`]
#[derive(Debug, Clone)]
pub struct PostgresPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// [`SqlDataSource`] over an sqlx PostgreSQL pool
pub struct PostgresDataSource {
    pool: PgPool,
}

impl PostgresDataSource {
    pub async fn connect(database_url: &str, config: &PostgresPoolConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(database_url)
            .await
            .map_err(|e| ResolutionError::Database(format!("Failed to connect: {}", e)))?;

        info!(
            "PostgreSQL data source connected (max {} connections)",
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run(&self, statement: &str, options: &QueryOptions) -> Result<Vec<SqlRow>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ResolutionError::Database(format!("Failed to begin transaction: {}", e)))?;

        if options.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| ResolutionError::Database(format!("Failed to set read only: {}", e)))?;
        }

        let statement = if options.stored_procedure {
            format!("CALL {}", statement.trim_start_matches("CALL ").trim())
        } else {
            statement.to_string()
        };
        let rows = sqlx::query(&statement)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| ResolutionError::Database(format!("Query failed: {}", e)))?;

        tx.rollback()
            .await
            .map_err(|e| ResolutionError::Database(format!("Failed to end transaction: {}", e)))?;

        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &PgRow) -> Result<SqlRow> {
    let mut decoded = SqlRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info().name())?;
        decoded.columns.push((column.name().to_string(), value));
    }
    Ok(decoded)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<SqlValue> {
    let err = |e: sqlx::Error| ResolutionError::Database(format!("Failed to decode column {}: {}", index, e));

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map_err(err)?.map(SqlValue::Boolean),
        "INT2" => row.try_get::<Option<i16>, _>(index).map_err(err)?.map(|v| SqlValue::Integer(v as i64)),
        "INT4" => row.try_get::<Option<i32>, _>(index).map_err(err)?.map(|v| SqlValue::Integer(v as i64)),
        "INT8" => row.try_get::<Option<i64>, _>(index).map_err(err)?.map(SqlValue::Integer),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map_err(err)?.map(|v| SqlValue::Float(v as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map_err(err)?.map(SqlValue::Float),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index).map_err(err)?.map(SqlValue::Bytes),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .map_err(err)?
            .map(SqlValue::Date),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .map_err(err)?
            .map(SqlValue::Time),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map_err(err)?
            .map(SqlValue::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(err)?
            .map(|ts| SqlValue::Timestamp(ts.naive_utc())),
        // NUMERIC and anything else without a direct mapping is read as text
        _ => row.try_get_unchecked::<Option<String>, _>(index).map_err(err)?.map(|s| {
            if type_name == "NUMERIC" {
                SqlValue::Decimal(s)
            } else {
                SqlValue::Text(s)
            }
        }),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[async_trait]
impl SqlDataSource for PostgresDataSource {
    async fn query(&self, statement: &str, options: &QueryOptions) -> Result<Vec<SqlRow>> {
        match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.run(statement, options))
                .await
                .map_err(|_| ResolutionError::Database(format!("Query timed out after {:?}", timeout)))?,
            None => self.run(statement, options).await,
        }
    }

    async fn check_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| ResolutionError::Database(format!("Connection check failed: {}", e)))?;
        Ok(())
    }

    fn supports_stored_procedures(&self) -> bool {
        true
    }
}
