//! Relational database data connector
//!
//! Renders an SQL statement from a template, runs it against a
//! [`SqlDataSource`] and turns every returned row into attribute values.
//! Columns can be mapped to attribute ids and coerced to a declared type;
//! unmapped columns keep their name and driver-native type.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use attrflow_core::{Attribute, AttributeMap, AttributeValue, FloatValue};

use crate::cache::ResultCache;
use crate::config::RdbmsConfig;
use crate::context::ResolutionContext;
use crate::error::{ResolutionError, Result};
use crate::plugin::{ConnectorConfig, DataConnector, ResolutionPlugin};
use crate::template::{CharacterEscapingStrategy, TemplateEngine};

/// Column value as returned by a driver
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    /// Exact numeric in canonical text form
    Decimal(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Convert with the driver-native type
    pub fn into_native(self) -> Option<AttributeValue> {
        Some(match self {
            SqlValue::Null => return None,
            SqlValue::Text(s) => AttributeValue::String(s),
            SqlValue::Integer(i) => AttributeValue::Integer(i),
            SqlValue::Float(f) => AttributeValue::Double(FloatValue(f)),
            SqlValue::Decimal(d) => AttributeValue::Decimal(d),
            SqlValue::Boolean(b) => AttributeValue::Boolean(b),
            SqlValue::Bytes(b) => AttributeValue::Bytes(b),
            SqlValue::Date(d) => AttributeValue::Date(d),
            SqlValue::Time(t) => AttributeValue::Time(t),
            SqlValue::Timestamp(ts) => AttributeValue::Timestamp(ts),
        })
    }

    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow {
    pub columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: SqlValue) -> Self {
        self.columns.push((column.to_string(), value));
        self
    }
}

/// Execution settings for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
    pub read_only: bool,
    pub stored_procedure: bool,
}

/// Executes statements for the relational connector
#[async_trait]
pub trait SqlDataSource: Send + Sync {
    async fn query(&self, statement: &str, options: &QueryOptions) -> Result<Vec<SqlRow>>;

    /// Check that a connection can be obtained
    async fn check_connection(&self) -> Result<()>;

    fn supports_stored_procedures(&self) -> bool {
        false
    }
}

/// Declared type of a mapped column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    BigDecimal,
    Boolean,
    Byte,
    ByteArray,
    Date,
    Double,
    Float,
    Integer,
    Long,
    Object,
    Short,
    String,
    Time,
    Timestamp,
    Url,
}

impl ColumnType {
    /// Coerce a driver value to this type; `Ok(None)` for SQL NULL
    pub fn coerce(&self, value: SqlValue) -> Result<Option<AttributeValue>> {
        if value == SqlValue::Null {
            return Ok(None);
        }
        let invalid = |value: &SqlValue| {
            ResolutionError::Database(format!("cannot convert {} to {:?}", value.describe(), self))
        };

        let coerced = match (self, value) {
            (ColumnType::Object, value) => return Ok(value.into_native()),
            (ColumnType::String, SqlValue::Text(s)) => AttributeValue::String(s),
            (ColumnType::String, SqlValue::Bytes(b)) => {
                AttributeValue::String(String::from_utf8(b).map_err(|e| ResolutionError::Database(e.to_string()))?)
            }
            (ColumnType::String, other) => match other.into_native() {
                Some(native) => AttributeValue::String(native.to_string()),
                None => return Ok(None),
            },
            (ColumnType::Boolean, SqlValue::Boolean(b)) => AttributeValue::Boolean(b),
            (ColumnType::Boolean, SqlValue::Integer(i)) => AttributeValue::Boolean(i != 0),
            (ColumnType::Boolean, SqlValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => AttributeValue::Boolean(true),
                "false" | "f" | "no" | "n" | "0" => AttributeValue::Boolean(false),
                _ => return Err(invalid(&SqlValue::Text(s))),
            },
            (ColumnType::Byte, value) => AttributeValue::Integer(Self::integer_in(value, i8::MIN as i64, i8::MAX as i64, *self)?),
            (ColumnType::Short, value) => AttributeValue::Integer(Self::integer_in(value, i16::MIN as i64, i16::MAX as i64, *self)?),
            (ColumnType::Integer, value) => AttributeValue::Integer(Self::integer_in(value, i32::MIN as i64, i32::MAX as i64, *self)?),
            (ColumnType::Long, value) => AttributeValue::Integer(Self::integer_in(value, i64::MIN, i64::MAX, *self)?),
            (ColumnType::Double, value) => AttributeValue::Double(FloatValue(Self::float(value, *self)?)),
            (ColumnType::Float, value) => AttributeValue::Double(FloatValue(Self::float(value, *self)? as f32 as f64)),
            (ColumnType::BigDecimal, SqlValue::Decimal(d)) => AttributeValue::Decimal(d),
            (ColumnType::BigDecimal, SqlValue::Integer(i)) => AttributeValue::Decimal(i.to_string()),
            (ColumnType::BigDecimal, SqlValue::Float(f)) => AttributeValue::Decimal(f.to_string()),
            (ColumnType::BigDecimal, SqlValue::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.parse::<f64>().is_err() {
                    return Err(invalid(&SqlValue::Text(s)));
                }
                AttributeValue::Decimal(trimmed.to_string())
            }
            (ColumnType::ByteArray, SqlValue::Bytes(b)) => AttributeValue::Bytes(b),
            (ColumnType::ByteArray, SqlValue::Text(s)) => AttributeValue::Bytes(s.into_bytes()),
            (ColumnType::Date, SqlValue::Date(d)) => AttributeValue::Date(d),
            (ColumnType::Date, SqlValue::Timestamp(ts)) => AttributeValue::Date(ts.date()),
            (ColumnType::Date, SqlValue::Text(s)) => AttributeValue::Date(
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| invalid(&SqlValue::Text(s.clone())))?,
            ),
            (ColumnType::Time, SqlValue::Time(t)) => AttributeValue::Time(t),
            (ColumnType::Time, SqlValue::Timestamp(ts)) => AttributeValue::Time(ts.time()),
            (ColumnType::Time, SqlValue::Text(s)) => AttributeValue::Time(
                NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").map_err(|_| invalid(&SqlValue::Text(s.clone())))?,
            ),
            (ColumnType::Timestamp, SqlValue::Timestamp(ts)) => AttributeValue::Timestamp(ts),
            (ColumnType::Timestamp, SqlValue::Date(d)) => AttributeValue::Timestamp(d.and_time(NaiveTime::MIN)),
            (ColumnType::Timestamp, SqlValue::Text(s)) => AttributeValue::Timestamp(
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                    .map_err(|_| invalid(&SqlValue::Text(s.clone())))?,
            ),
            (ColumnType::Url, SqlValue::Text(s)) => {
                if let Err(e) = Url::parse(s.trim()) {
                    return Err(ResolutionError::Database(format!("cannot convert '{}' to Url: {}", s, e)));
                }
                AttributeValue::Url(s)
            }
            (_, other) => return Err(invalid(&other)),
        };
        Ok(Some(coerced))
    }

    fn integer_in(value: SqlValue, min: i64, max: i64, column_type: ColumnType) -> Result<i64> {
        let parsed = match &value {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Boolean(b) => Some(*b as i64),
            SqlValue::Text(s) | SqlValue::Decimal(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .filter(|i| (min..=max).contains(i))
            .ok_or_else(|| ResolutionError::Database(format!("cannot convert {} to {:?}", value.describe(), column_type)))
    }

    fn float(value: SqlValue, column_type: ColumnType) -> Result<f64> {
        let parsed = match &value {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Text(s) | SqlValue::Decimal(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| ResolutionError::Database(format!("cannot convert {} to {:?}", value.describe(), column_type)))
    }
}

/// Maps a result column to an attribute id and type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub attribute_id: String,
    pub data_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(column_name: &str, attribute_id: &str, data_type: ColumnType) -> Self {
        Self {
            column_name: column_name.to_string(),
            attribute_id: attribute_id.to_string(),
            data_type,
        }
    }
}

/// Escapes values for SQL string literals by doubling single quotes
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValueEscaping;

impl CharacterEscapingStrategy for SqlValueEscaping {
    fn escape(&self, value: &str) -> String {
        value.replace('\'', "''")
    }
}

/// Data connector backed by an SQL query
pub struct RdbmsDataConnector {
    config: ConnectorConfig,
    template_name: String,
    template_engine: Arc<dyn TemplateEngine>,
    data_source: Arc<dyn SqlDataSource>,
    /// Keyed by lower-cased column name
    column_descriptors: HashMap<String, ColumnDescriptor>,
    options: QueryOptions,
    no_result_is_error: bool,
    cache: Option<Arc<ResultCache>>,
}

impl RdbmsDataConnector {
    /// Create the connector and register its statement template
    pub fn new(
        config: ConnectorConfig,
        statement_template: &str,
        template_engine: Arc<dyn TemplateEngine>,
        data_source: Arc<dyn SqlDataSource>,
    ) -> Result<Self> {
        let template_name = format!("resolver.dc.{}", config.plugin.id);
        template_engine.register_template(&template_name, statement_template)?;

        Ok(Self {
            config,
            template_name,
            template_engine,
            data_source,
            column_descriptors: HashMap::new(),
            options: QueryOptions {
                timeout: None,
                read_only: true,
                stored_procedure: false,
            },
            no_result_is_error: false,
            cache: None,
        })
    }

    pub fn with_column(mut self, descriptor: ColumnDescriptor) -> Self {
        self.column_descriptors
            .insert(descriptor.column_name.to_lowercase(), descriptor);
        self
    }

    /// Apply shared relational settings
    pub fn with_settings(mut self, settings: &RdbmsConfig) -> Self {
        self.options = QueryOptions {
            timeout: settings.query_timeout(),
            read_only: settings.read_only_connection,
            stored_procedure: settings.uses_stored_procedure,
        };
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn read_only_connection(mut self, read_only: bool) -> Self {
        self.options.read_only = read_only;
        self
    }

    pub fn uses_stored_procedure(mut self, stored_procedure: bool) -> Self {
        self.options.stored_procedure = stored_procedure;
        self
    }

    pub fn no_result_is_error(mut self, is_error: bool) -> Self {
        self.no_result_is_error = is_error;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn build_attributes(&self, rows: Vec<SqlRow>) -> Result<AttributeMap> {
        let mut attributes = AttributeMap::new();
        for row in rows {
            for (column, value) in row.columns {
                let (attribute_id, value) = match self.column_descriptors.get(&column.to_lowercase()) {
                    Some(descriptor) => (
                        descriptor.attribute_id.clone(),
                        descriptor.data_type.coerce(value).map_err(|e| {
                            ResolutionError::connector(self.id(), format!("column '{}': {}", column, e))
                        })?,
                    ),
                    None => (column, value.into_native()),
                };

                let attribute = attributes
                    .entry(attribute_id.clone())
                    .or_insert_with(|| Attribute::new(attribute_id));
                if let Some(value) = value {
                    attribute.add_value(value);
                }
            }
        }
        Ok(attributes)
    }
}

#[async_trait]
impl ResolutionPlugin for RdbmsDataConnector {
    fn id(&self) -> &str {
        &self.config.plugin.id
    }

    fn dependency_ids(&self) -> &[String] {
        &self.config.plugin.dependency_ids
    }

    async fn validate(&self) -> Result<()> {
        self.data_source
            .check_connection()
            .await
            .map_err(|e| ResolutionError::invalid_config(self.id(), format!("unable to connect: {}", e)))?;

        if self.options.stored_procedure && !self.data_source.supports_stored_procedures() {
            return Err(ResolutionError::invalid_config(
                self.id(),
                "data source does not support stored procedures",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DataConnector for RdbmsDataConnector {
    fn failover_dependency_id(&self) -> Option<&str> {
        self.config.failover_dependency_id.as_deref()
    }

    async fn resolve(&self, ctx: &ResolutionContext) -> Result<AttributeMap> {
        let statement = self.template_engine.create_statement(
            &self.template_name,
            ctx,
            self.dependency_ids(),
            &SqlValueEscaping,
        )?;
        debug!("Data connector '{}' statement: {}", self.id(), statement);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&statement) {
                debug!("Data connector '{}' served statement from cache", self.id());
                return Ok(cached);
            }
        }

        let rows = self
            .data_source
            .query(&statement, &self.options)
            .await
            .map_err(|e| ResolutionError::connector(self.id(), e))?;

        if rows.is_empty() && self.no_result_is_error {
            warn!("Data connector '{}' returned no rows", self.id());
            return Err(ResolutionError::NoResult(self.id().to_string()));
        }

        let attributes = self.build_attributes(rows)?;
        if let Some(cache) = &self.cache {
            cache.put(&statement, attributes.clone());
        }
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::SimpleTemplateEngine;
    use attrflow_core::AttributeRequestContext;
    use parking_lot::Mutex;

    struct MemoryDataSource {
        rows: Vec<SqlRow>,
        statements: Mutex<Vec<(String, QueryOptions)>>,
        procedures: bool,
    }

    #[async_trait]
    impl SqlDataSource for MemoryDataSource {
        async fn query(&self, statement: &str, options: &QueryOptions) -> Result<Vec<SqlRow>> {
            self.statements.lock().push((statement.to_string(), *options));
            if statement.contains("nobody") {
                return Ok(Vec::new());
            }
            Ok(self.rows.clone())
        }

        async fn check_connection(&self) -> Result<()> {
            Ok(())
        }

        fn supports_stored_procedures(&self) -> bool {
            self.procedures
        }
    }

    fn source() -> Arc<MemoryDataSource> {
        Arc::new(MemoryDataSource {
            rows: vec![
                SqlRow::new()
                    .with("GROUP_NAME", SqlValue::Text("staff".into()))
                    .with("gid", SqlValue::Text("100".into()))
                    .with("since", SqlValue::Null),
                SqlRow::new()
                    .with("GROUP_NAME", SqlValue::Text("admins".into()))
                    .with("gid", SqlValue::Text("200".into()))
                    .with("since", SqlValue::Timestamp(
                        NaiveDate::from_ymd_opt(2020, 1, 2)
                            .and_then(|d| d.and_hms_opt(3, 4, 5))
                            .unwrap(),
                    )),
            ],
            statements: Mutex::new(Vec::new()),
            procedures: false,
        })
    }

    fn connector(source: Arc<MemoryDataSource>) -> RdbmsDataConnector {
        RdbmsDataConnector::new(
            ConnectorConfig::new("groups"),
            "SELECT * FROM groups WHERE uid = '{{requestContext.principalName}}'",
            Arc::new(SimpleTemplateEngine::new()),
            source,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rows_map_to_attributes() {
        let source = source();
        let connector = connector(Arc::clone(&source))
            .with_column(ColumnDescriptor::new("group_name", "memberOf", ColumnType::String))
            .with_column(ColumnDescriptor::new("GID", "gidNumber", ColumnType::Integer))
            .with_query_timeout(Duration::from_secs(5));

        let ctx = ResolutionContext::new(AttributeRequestContext::new().with_principal("o'neil"));
        let attributes = connector.resolve(&ctx).await.unwrap();

        assert_eq!(
            attributes["memberOf"].values(),
            &[AttributeValue::from("staff"), AttributeValue::from("admins")]
        );
        assert_eq!(
            attributes["gidNumber"].values(),
            &[AttributeValue::Integer(100), AttributeValue::Integer(200)]
        );
        // unmapped column keeps its name and native type; NULL is skipped
        assert_eq!(attributes["since"].len(), 1);
        assert!(matches!(attributes["since"].values()[0], AttributeValue::Timestamp(_)));

        let (statement, options) = source.statements.lock()[0].clone();
        assert_eq!(statement, "SELECT * FROM groups WHERE uid = 'o''neil'");
        assert!(options.read_only);
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_no_result_is_error() {
        let connector = connector(source()).no_result_is_error(true);
        let ctx = ResolutionContext::new(AttributeRequestContext::new().with_principal("nobody"));

        assert!(matches!(connector.resolve(&ctx).await, Err(ResolutionError::NoResult(_))));
    }

    #[tokio::test]
    async fn test_validate_requires_stored_procedure_support() {
        let settings = RdbmsConfig {
            uses_stored_procedure: true,
            ..RdbmsConfig::default()
        };
        let connector = connector(source()).with_settings(&settings);
        assert!(matches!(
            connector.validate().await,
            Err(ResolutionError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_column_coercion() {
        assert_eq!(
            ColumnType::Boolean.coerce(SqlValue::Text("Y".into())).unwrap(),
            Some(AttributeValue::Boolean(true))
        );
        assert!(ColumnType::Byte.coerce(SqlValue::Integer(300)).is_err());
        assert_eq!(
            ColumnType::BigDecimal.coerce(SqlValue::Integer(12)).unwrap(),
            Some(AttributeValue::Decimal("12".into()))
        );
        assert_eq!(
            ColumnType::Url.coerce(SqlValue::Text("https://example.org".into())).unwrap(),
            Some(AttributeValue::Url("https://example.org".into()))
        );
        assert!(ColumnType::Url.coerce(SqlValue::Text("not a url".into())).is_err());
        assert!(ColumnType::Url.coerce(SqlValue::Text("http: x".into())).is_err());
        assert!(ColumnType::Url.coerce(SqlValue::Text("https://exa mple.org/".into())).is_err());
        assert_eq!(ColumnType::String.coerce(SqlValue::Null).unwrap(), None);
        assert_eq!(
            ColumnType::Date.coerce(SqlValue::Text("2021-03-04".into())).unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 4).map(AttributeValue::Date)
        );
    }
}
