//! Attribute value model
//!
//! An [`Attribute`] is an identifier plus an ordered list of [`AttributeValue`]s.
//! Values are hashable so they can be deduplicated and collected into retained
//! value sets by the filtering engine.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// Mapping of attribute id to attribute
pub type AttributeMap = HashMap<String, Attribute>;

/// Ordering used when an attribute's values must be presented sorted
pub type ValueComparator = Arc<dyn Fn(&AttributeValue, &AttributeValue) -> Ordering + Send + Sync>;

/// 64-bit float with bitwise equality so it can live in hash sets
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloatValue(pub f64);

impl PartialEq for FloatValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatValue {}

impl Hash for FloatValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Structured subject identifier value (SAML NameID / NameIdentifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameIdentifierValue {
    pub value: String,
    pub format: Option<String>,
    pub name_qualifier: Option<String>,
    pub sp_name_qualifier: Option<String>,
}

impl NameIdentifierValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }
}

/// Value qualified by a security domain, rendered as `value@scope`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedValue {
    pub value: String,
    pub scope: String,
}

impl ScopedValue {
    pub fn new(value: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            scope: scope.into(),
        }
    }

    /// Split a pre-scoped string such as `staff@example.org`
    ///
    /// # Errors
    ///
    /// Fails unless the delimiter occurs exactly once.
    pub fn parse(raw: &str, delimiter: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(delimiter).collect();
        if delimiter.is_empty() || parts.len() != 2 {
            return Err(CoreError::InvalidScopedValue {
                value: raw.to_string(),
                delimiter: delimiter.to_string(),
            });
        }
        Ok(Self::new(parts[0], parts[1]))
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    /// Arbitrary-precision decimal kept in its canonical text form
    Decimal(String),
    Double(FloatValue),
    Boolean(bool),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Url(String),
    NameId(NameIdentifierValue),
    Scoped(ScopedValue),
    /// Serialized XML fragment
    Xml(String),
}

impl AttributeValue {
    /// Borrow the value as a string slice when it is textual
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s)
            | AttributeValue::Decimal(s)
            | AttributeValue::Url(s)
            | AttributeValue::Xml(s) => Some(s),
            AttributeValue::NameId(id) => Some(&id.value),
            AttributeValue::Scoped(scoped) => Some(&scoped.value),
            _ => None,
        }
    }

    /// Text used for string and regex comparisons
    ///
    /// Scoped values compare on their unscoped part; everything else on its
    /// display form.
    pub fn text(&self) -> Cow<'_, str> {
        match self.as_str() {
            Some(s) => Cow::Borrowed(s),
            None => Cow::Owned(self.to_string()),
        }
    }

    /// Scope of a scoped value
    pub fn scope(&self) -> Option<&str> {
        match self {
            AttributeValue::Scoped(scoped) => Some(&scoped.scope),
            _ => None,
        }
    }

    /// True for a textual value holding the empty string
    pub fn is_blank(&self) -> bool {
        matches!(self.as_str(), Some(s) if s.is_empty())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s)
            | AttributeValue::Decimal(s)
            | AttributeValue::Url(s)
            | AttributeValue::Xml(s) => f.write_str(s),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Double(d) => write!(f, "{}", d.0),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::Bytes(bytes) => f.write_str(&STANDARD.encode(bytes)),
            AttributeValue::Date(d) => write!(f, "{}", d),
            AttributeValue::Time(t) => write!(f, "{}", t),
            AttributeValue::Timestamp(ts) => write!(f, "{}", ts),
            AttributeValue::NameId(id) => f.write_str(&id.value),
            AttributeValue::Scoped(scoped) => write!(f, "{}@{}", scoped.value, scoped.scope),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(FloatValue(value))
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        AttributeValue::Bytes(value)
    }
}

impl From<NameIdentifierValue> for AttributeValue {
    fn from(value: NameIdentifierValue) -> Self {
        AttributeValue::NameId(value)
    }
}

impl From<ScopedValue> for AttributeValue {
    fn from(value: ScopedValue) -> Self {
        AttributeValue::Scoped(value)
    }
}

/// Resolved attribute: an id and its ordered values
#[derive(Clone)]
pub struct Attribute {
    id: String,
    values: Vec<AttributeValue>,
    comparator: Option<ValueComparator>,
}

impl Attribute {
    /// Create an attribute with no values
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Vec::new(),
            comparator: None,
        }
    }

    /// Create an attribute from an iterator of values
    pub fn with_values<I, V>(id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        Self {
            id: id.into(),
            values: values.into_iter().map(Into::into).collect(),
            comparator: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<AttributeValue> {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<AttributeValue> {
        self.values
    }

    pub fn add_value(&mut self, value: impl Into<AttributeValue>) {
        self.values.push(value.into());
    }

    pub fn extend_values<I: IntoIterator<Item = AttributeValue>>(&mut self, values: I) {
        self.values.extend(values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn comparator(&self) -> Option<&ValueComparator> {
        self.comparator.as_ref()
    }

    pub fn set_comparator(&mut self, comparator: ValueComparator) {
        self.comparator = Some(comparator);
    }

    /// Remove repeated values, keeping the first occurrence of each
    ///
    /// Returns the number of values removed. Calling it again on the same
    /// attribute removes nothing.
    pub fn dedup_values(&mut self) -> usize {
        let before = self.values.len();
        let mut seen = HashSet::with_capacity(before);
        self.values.retain(|value| seen.insert(value.clone()));
        before - self.values.len()
    }

    /// Values ordered by the comparator, or insertion order without one
    pub fn sorted_values(&self) -> Vec<AttributeValue> {
        let mut values = self.values.clone();
        if let Some(comparator) = &self.comparator {
            values.sort_by(|a, b| comparator(a, b));
        }
        values
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("id", &self.id)
            .field("values", &self.values)
            .field("comparator", &self.comparator.is_some())
            .finish()
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.values == other.values
    }
}
