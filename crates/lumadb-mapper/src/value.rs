//! Application-side values and entities.
//!
//! [`Value`] is what entities hand to the mapper: richer than the wire model
//! (booleans, dates, JSON lists and maps), and converted by the
//! [`coercer`](crate::coercer) on the way to and from the store.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::core::Number;
use crate::error::{MapperError, Result};

/// Application value held by an entity attribute.
///
/// # Example
///
/// ```rust
/// use lumadb_mapper::Value;
///
/// let region = Value::from("europe");
/// let subtotal = Value::from(10.0);
/// let missing = Value::from(None::<String>);
/// assert!(missing.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Unset attribute
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Binary blob
    Binary(Vec<u8>),
    /// String set
    StringSet(BTreeSet<String>),
    /// Number set
    NumberSet(BTreeSet<Number>),
    /// Binary set
    BinarySet(BTreeSet<Vec<u8>>),
    /// Ordered list of JSON values
    List(Vec<serde_json::Value>),
    /// JSON object
    Map(serde_json::Map<String, serde_json::Value>),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time with an offset
    DateTime(DateTime<FixedOffset>),
    /// Point in time
    Time(DateTime<Utc>),
}

impl Value {
    /// Check if the value is null
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or an empty string
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Try to get as boolean
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as float
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get the type name for error messages
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::StringSet(_) => "string_set",
            Value::NumberSet(_) => "number_set",
            Value::BinarySet(_) => "binary_set",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Time(_) => "time",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<BTreeSet<String>> for Value {
    fn from(v: BTreeSet<String>) -> Self {
        Value::StringSet(v)
    }
}

impl From<BTreeSet<Number>> for Value {
    fn from(v: BTreeSet<Number>) -> Self {
        Value::NumberSet(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion out of a [`Value`] into a typed entity field.
///
/// `Option<T>` maps [`Value::Null`] to `None`; every other target rejects
/// null.
pub trait FromValue: Sized {
    /// Name used in coercion errors
    const EXPECTED: &'static str;

    /// Convert, returning `None` on a type mismatch
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! from_value {
    ($ty:ty, $expected:literal, $($pat:pat => $out:expr),+ $(,)?) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    $($pat => Some($out),)+
                    _ => None,
                }
            }
        }
    };
}

from_value!(bool, "Boolean", Value::Bool(b) => b);
from_value!(i64, "Integer", Value::Integer(i) => i);
from_value!(f64, "Float", Value::Float(f) => f, Value::Integer(i) => i as f64);
from_value!(String, "String", Value::String(s) => s);
from_value!(Vec<u8>, "Binary", Value::Binary(b) => b);
from_value!(BTreeSet<String>, "Set", Value::StringSet(s) => s);
from_value!(BTreeSet<Number>, "Set", Value::NumberSet(s) => s);
from_value!(BTreeSet<Vec<u8>>, "Set", Value::BinarySet(s) => s);
from_value!(Vec<serde_json::Value>, "Array", Value::List(l) => l);
from_value!(NaiveDate, "Date", Value::Date(d) => d);
from_value!(DateTime<FixedOffset>, "DateTime", Value::DateTime(d) => d);
from_value!(DateTime<Utc>, "Time", Value::Time(t) => t);

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            v => T::from_value(v).map(Some),
        }
    }
}

/// Logical attribute name to application value.
///
/// The entity-side counterpart of a [`Record`](crate::core::Record).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: BTreeMap<String, Value>,
}

impl Attributes {
    /// Create an empty attribute set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an attribute
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Get an attribute value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a mutable attribute value by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    /// Remove an attribute, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Remove an attribute and convert it into a typed field.
    ///
    /// A missing attribute is treated as [`Value::Null`].
    pub fn take<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let value = self.values.remove(name).unwrap_or_default();
        let actual = value.type_name();
        T::from_value(value).ok_or_else(|| MapperError::coercion(name, T::EXPECTED, actual))
    }

    /// Check whether an attribute is present and not null
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_null())
    }

    /// Number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over attributes in name order
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }
}

impl FromIterator<(String, Value)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Attributes {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// A typed application object persisted through the mapper.
///
/// Field names correspond to the logical attribute names of the
/// collection's [`Schema`](crate::schema::Schema).
///
/// # Example
///
/// ```rust
/// use lumadb_mapper::{Attributes, Entity, Result, Value};
///
/// #[derive(Debug, Default)]
/// struct User {
///     id: Option<String>,
///     name: String,
/// }
///
/// impl Entity for User {
///     fn to_attributes(&self) -> Attributes {
///         Attributes::new()
///             .with("id", self.id.clone())
///             .with("name", self.name.clone())
///     }
///
///     fn from_attributes(mut attributes: Attributes) -> Result<Self> {
///         Ok(Self {
///             id: attributes.take("id")?,
///             name: attributes.take("name")?,
///         })
///     }
///
///     fn set_identity(&mut self, _attribute: &str, identity: Value) {
///         self.id = identity.as_str().map(str::to_string);
///     }
/// }
/// ```
pub trait Entity: Sized {
    /// Snapshot the entity's attributes by logical name
    fn to_attributes(&self) -> Attributes;

    /// Build an entity from attributes read back from the store
    fn from_attributes(attributes: Attributes) -> Result<Self>;

    /// Assign a generated identity in place
    fn set_identity(&mut self, attribute: &str, identity: Value);
}

/// Schema-less entity holding its attributes directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    attributes: Attributes,
}

impl Document {
    /// Create an empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insert
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name, value);
        self
    }

    /// Add or replace an attribute
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name, value);
    }

    /// Remove an attribute
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    /// Get an attribute value by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All attributes
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl Entity for Document {
    fn to_attributes(&self) -> Attributes {
        self.attributes.clone()
    }

    fn from_attributes(attributes: Attributes) -> Result<Self> {
        Ok(Self { attributes })
    }

    fn set_identity(&mut self, attribute: &str, identity: Value) {
        self.attributes.insert(attribute, identity);
    }
}

impl From<Attributes> for Document {
    fn from(attributes: Attributes) -> Self {
        Self { attributes }
    }
}
