//! Core wire types and the store boundary.
//!
//! This module defines what travels between the mapper and a DynamoDB-style
//! store: attribute values, records, conditions, request options and
//! response pages, plus the [`StoreClient`] trait every transport implements.
//!
//! The wire model is deliberately narrow. It carries strings, numbers,
//! binaries and homogeneous sets only; booleans, dates, lists and maps are
//! coerced into one of those by the [`coercer`](crate::coercer) before they
//! reach this layer.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MapperError, Result};

/// A number as carried by the store's `N` type.
///
/// Integers and decimals are kept apart so that an integer written by the
/// mapper reads back as the same integer.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
}

impl Number {
    /// Parse a wire number, integer first, then float
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(i) = text.parse::<i64>() {
            Some(Number::Integer(i))
        } else {
            text.parse::<f64>().ok().filter(|f| f.is_finite()).map(Number::Float)
        }
    }

    /// Numeric value as a float
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Numeric value as an integer, truncating decimals
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64(self) -> i64 {
        match self {
            Number::Integer(i) => i,
            Number::Float(f) => f as i64,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (*self, *other) {
            (Number::Integer(a), Number::Integer(b)) => a.cmp(&b),
            (Number::Integer(a), Number::Float(b)) => cmp_integer_float(a, b),
            (Number::Float(a), Number::Integer(b)) => cmp_integer_float(b, a).reverse(),
            (Number::Float(a), Number::Float(b)) => {
                a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
            }
        }
    }
}

/// Exact comparison of an integer against a float, without rounding the
/// integer. NaNs sort like [`f64::total_cmp`].
fn cmp_integer_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above every i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }

    let floor = f.floor();
    #[allow(clippy::cast_possible_truncation)]
    let whole = floor as i64;
    i.cmp(&whole).then(if f > floor {
        Ordering::Less
    } else {
        Ordering::Equal
    })
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Integer(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

/// A single attribute value as accepted by the store.
///
/// Variant names follow the store's type descriptors (`S`, `N`, `B`, `SS`,
/// `NS`, `BS`). Sets are kept sorted and deduplicated by the coercer.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String
    S(String),
    /// Number
    N(Number),
    /// Binary
    B(Vec<u8>),
    /// String set
    Ss(Vec<String>),
    /// Number set
    Ns(Vec<Number>),
    /// Binary set
    Bs(Vec<Vec<u8>>),
}

impl AttributeValue {
    /// Type descriptor, for error messages and the JSON wire format
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Ss(_) => "SS",
            AttributeValue::Ns(_) => "NS",
            AttributeValue::Bs(_) => "BS",
        }
    }

    /// True for values the store treats as empty (`""`, empty binary or set)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::S(s) => s.is_empty(),
            AttributeValue::N(_) => false,
            AttributeValue::B(b) => b.is_empty(),
            AttributeValue::Ss(v) => v.is_empty(),
            AttributeValue::Ns(v) => v.is_empty(),
            AttributeValue::Bs(v) => v.is_empty(),
        }
    }

    /// Try to get as string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as number
    #[must_use]
    pub fn as_number(&self) -> Option<Number> {
        match self {
            AttributeValue::N(n) => Some(*n),
            _ => None,
        }
    }

    /// Order two scalar values of the same type.
    ///
    /// Returns `None` for sets and for values of different types, which the
    /// store never considers comparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
            (AttributeValue::N(a), AttributeValue::N(b)) => Some(a.cmp(b)),
            (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::S(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::S(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::N(Number::Integer(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::N(Number::Float(v))
    }
}

/// Physical representation of an item: attribute name to wire value.
pub type Record = BTreeMap<String, AttributeValue>;

// ===== Key Schema =====

/// Role of an attribute in a key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Partition key
    Hash,
    /// Sort key
    Range,
}

impl KeyType {
    /// Wire name of the key type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Hash => "HASH",
            KeyType::Range => "RANGE",
        }
    }
}

/// One entry of a key schema descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchemaElement {
    /// Physical attribute name
    pub attribute_name: String,
    /// Key role
    pub key_type: KeyType,
}

impl KeySchemaElement {
    /// Partition key element
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Hash,
        }
    }

    /// Sort key element
    pub fn range(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Range,
        }
    }
}

/// Resolved key schema of a table or index.
///
/// Holds exactly one partition key and at most one sort key; attribute names
/// iterate partition key first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    hash_key: String,
    range_key: Option<String>,
}

impl KeySchema {
    /// Validate a descriptor and resolve it into a key schema
    pub fn from_elements(elements: &[KeySchemaElement]) -> Result<Self> {
        let mut hash_key = None;
        let mut range_key = None;

        for element in elements {
            let slot = match element.key_type {
                KeyType::Hash => &mut hash_key,
                KeyType::Range => &mut range_key,
            };
            if slot.is_some() {
                return Err(MapperError::Schema(format!(
                    "key schema declares more than one {} key",
                    element.key_type.as_str()
                )));
            }
            *slot = Some(element.attribute_name.clone());
        }

        let hash_key = hash_key
            .ok_or_else(|| MapperError::Schema("key schema has no HASH key".into()))?;

        Ok(Self {
            hash_key,
            range_key,
        })
    }

    /// Partition key attribute name
    #[must_use]
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    /// Sort key attribute name, if any
    #[must_use]
    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    /// Number of key attributes (1 or 2)
    #[must_use]
    pub fn len(&self) -> usize {
        1 + usize::from(self.range_key.is_some())
    }

    /// Key schemas are never empty; provided for API symmetry with `len`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check whether an attribute takes part in the key
    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.hash_key == attribute || self.range_key.as_deref() == Some(attribute)
    }

    /// Role of an attribute in this key schema
    #[must_use]
    pub fn key_type(&self, attribute: &str) -> Option<KeyType> {
        if self.hash_key == attribute {
            Some(KeyType::Hash)
        } else if self.range_key.as_deref() == Some(attribute) {
            Some(KeyType::Range)
        } else {
            None
        }
    }

    /// Key attribute names, partition key first
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hash_key.as_str()).chain(self.range_key.as_deref())
    }

    /// Project the key attributes out of a record
    #[must_use]
    pub fn extract(&self, record: &Record) -> Record {
        self.attribute_names()
            .filter_map(|name| record.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }
}

// ===== Table Metadata =====

/// Index projection type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IndexProjection {
    /// All attributes
    #[default]
    All,
    /// Keys only
    KeysOnly,
    /// Keys plus the listed attributes
    Include(Vec<String>),
}

/// Secondary index metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    /// Index name
    pub index_name: String,
    /// Key schema of the index
    pub key_schema: Vec<KeySchemaElement>,
    /// Projected attributes
    pub projection: IndexProjection,
}

impl IndexDescription {
    /// Create an index description projecting all attributes
    pub fn new(name: impl Into<String>, key_schema: Vec<KeySchemaElement>) -> Self {
        Self {
            index_name: name.into(),
            key_schema,
            projection: IndexProjection::All,
        }
    }

    /// Override the projection
    #[must_use]
    pub fn with_projection(mut self, projection: IndexProjection) -> Self {
        self.projection = projection;
        self
    }
}

/// Table metadata as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    /// Table name
    pub table_name: String,
    /// Primary key schema
    pub key_schema: Vec<KeySchemaElement>,
    /// Local secondary indexes
    pub local_secondary_indexes: Vec<IndexDescription>,
    /// Global secondary indexes
    pub global_secondary_indexes: Vec<IndexDescription>,
}

impl TableDescription {
    /// Create a description with the given primary key schema
    pub fn new(name: impl Into<String>, key_schema: Vec<KeySchemaElement>) -> Self {
        Self {
            table_name: name.into(),
            key_schema,
            local_secondary_indexes: Vec::new(),
            global_secondary_indexes: Vec::new(),
        }
    }

    /// Add a local secondary index
    #[must_use]
    pub fn with_local_index(mut self, index: IndexDescription) -> Self {
        self.local_secondary_indexes.push(index);
        self
    }

    /// Add a global secondary index
    #[must_use]
    pub fn with_global_index(mut self, index: IndexDescription) -> Self {
        self.global_secondary_indexes.push(index);
        self
    }

    /// Find a secondary index, local or global, by name
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDescription> {
        self.local_secondary_indexes
            .iter()
            .chain(&self.global_secondary_indexes)
            .find(|i| i.index_name == name)
    }
}

// ===== Conditions and Request Options =====

/// Comparison operators understood by key conditions and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    In,
    Between,
    NotNull,
    Null,
    Contains,
    NotContains,
    BeginsWith,
}

impl ComparisonOperator {
    /// Wire name of the operator
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "EQ",
            ComparisonOperator::Ne => "NE",
            ComparisonOperator::Le => "LE",
            ComparisonOperator::Lt => "LT",
            ComparisonOperator::Ge => "GE",
            ComparisonOperator::Gt => "GT",
            ComparisonOperator::In => "IN",
            ComparisonOperator::Between => "BETWEEN",
            ComparisonOperator::NotNull => "NOT_NULL",
            ComparisonOperator::Null => "NULL",
            ComparisonOperator::Contains => "CONTAINS",
            ComparisonOperator::NotContains => "NOT_CONTAINS",
            ComparisonOperator::BeginsWith => "BEGINS_WITH",
        }
    }

    /// Operators that carry no attribute value list
    #[must_use]
    pub fn is_unary(self) -> bool {
        matches!(self, ComparisonOperator::Null | ComparisonOperator::NotNull)
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single condition entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub comparison_operator: ComparisonOperator,
    pub attribute_value_list: Option<Vec<AttributeValue>>,
}

impl Condition {
    /// Build a condition from an operator and its operands
    #[must_use]
    pub fn new(
        comparison_operator: ComparisonOperator,
        attribute_value_list: Option<Vec<AttributeValue>>,
    ) -> Self {
        Self {
            comparison_operator,
            attribute_value_list,
        }
    }
}

/// Conditions keyed by physical attribute name.
pub type Conditions = BTreeMap<String, Condition>;

/// How filter conditions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionalOperator {
    #[default]
    And,
    Or,
}

/// What a query or scan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Select {
    #[default]
    AllAttributes,
    SpecificAttributes,
    Count,
}

impl Select {
    /// Wire name of the selection mode
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Select::AllAttributes => "ALL_ATTRIBUTES",
            Select::SpecificAttributes => "SPECIFIC_ATTRIBUTES",
            Select::Count => "COUNT",
        }
    }
}

/// Options for query and scan calls.
///
/// Unset fields are left to the store's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Key conditions (query only)
    pub key_conditions: Conditions,
    /// Filter applied after key conditions (query only)
    pub query_filter: Conditions,
    /// Filter applied to every scanned item (scan only)
    pub scan_filter: Conditions,
    /// Combination of filter conditions
    pub conditional_operator: Option<ConditionalOperator>,
    /// Selection mode
    pub select: Option<Select>,
    /// Projection for `Select::SpecificAttributes`
    pub attributes_to_get: Option<Vec<String>>,
    /// Ascending (`true`) or descending index traversal
    pub scan_index_forward: Option<bool>,
    /// Maximum number of items to evaluate
    pub limit: Option<usize>,
    /// Continuation token from a previous page
    pub exclusive_start_key: Option<Record>,
    /// Strongly consistent read flag
    pub consistent_read: Option<bool>,
    /// Secondary index to read from
    pub index_name: Option<String>,
}

/// Action applied to one attribute by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeAction {
    /// Replace the attribute value
    Put,
    /// Remove the attribute
    Delete,
}

/// Attribute-level update entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUpdate {
    pub value: Option<AttributeValue>,
    pub action: AttributeAction,
}

impl AttributeUpdate {
    /// Replace the attribute with a value
    #[must_use]
    pub fn put(value: AttributeValue) -> Self {
        Self {
            value: Some(value),
            action: AttributeAction::Put,
        }
    }

    /// Remove the attribute
    #[must_use]
    pub fn delete() -> Self {
        Self {
            value: None,
            action: AttributeAction::Delete,
        }
    }
}

/// Attribute updates keyed by physical attribute name.
pub type AttributeUpdates = BTreeMap<String, AttributeUpdate>;

/// One page of a query or scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponsePage {
    /// Number of items matching the request on this page
    pub count: usize,
    /// Number of items evaluated before filtering
    pub scanned_count: usize,
    /// Matching items, absent in count mode
    pub items: Option<Vec<Record>>,
    /// Continuation token, present when more pages exist
    pub last_evaluated_key: Option<Record>,
}

// ===== Store Boundary =====

/// Errors surfaced by a store transport.
///
/// The mapper passes these through unchanged; it never retries or
/// reclassifies them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Table, index or item container does not exist
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Request was rejected by the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store throttled the request
    #[error("Throughput exceeded: {0}")]
    ThroughputExceeded(String),

    /// Call exceeded its time budget
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network or service failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Get DynamoDB-style error code
    #[must_use]
    pub fn dynamodb_code(&self) -> &'static str {
        match self {
            StoreError::ResourceNotFound(_) => "ResourceNotFoundException",
            StoreError::Validation(_) => "ValidationException",
            StoreError::ThroughputExceeded(_) => "ProvisionedThroughputExceededException",
            StoreError::Timeout(_) => "RequestTimeout",
            StoreError::Transport(_) => "InternalServerError",
        }
    }
}

/// Transport boundary to a DynamoDB-style store.
///
/// Every call is synchronous and blocks for one round trip. Implementations
/// own connection handling, retries and time budgets; a call that times out
/// must surface as [`StoreError::Timeout`].
///
/// # Thread Safety
///
/// Clients must be `Send + Sync` so one client can back many collections.
pub trait StoreClient: Send + Sync {
    /// Write a whole item, replacing any item with the same key.
    fn put_item(&self, table: &str, item: Record) -> std::result::Result<(), StoreError>;

    /// Apply attribute-level updates to the item with the given key,
    /// creating it if missing.
    fn update_item(
        &self,
        table: &str,
        key: Record,
        updates: AttributeUpdates,
    ) -> std::result::Result<(), StoreError>;

    /// Delete the item with the given key. Deleting a missing item succeeds.
    fn delete_item(&self, table: &str, key: Record) -> std::result::Result<(), StoreError>;

    /// Fetch the item with the given key.
    fn get_item(&self, table: &str, key: Record)
        -> std::result::Result<Option<Record>, StoreError>;

    /// Run an index query.
    fn query(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> std::result::Result<ResponsePage, StoreError>;

    /// Run a full scan.
    fn scan(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> std::result::Result<ResponsePage, StoreError>;

    /// Describe a table's key schema and indexes.
    fn describe_table(&self, table: &str) -> std::result::Result<TableDescription, StoreError>;
}

impl<T: StoreClient + ?Sized> StoreClient for Arc<T> {
    fn put_item(&self, table: &str, item: Record) -> std::result::Result<(), StoreError> {
        (**self).put_item(table, item)
    }

    fn update_item(
        &self,
        table: &str,
        key: Record,
        updates: AttributeUpdates,
    ) -> std::result::Result<(), StoreError> {
        (**self).update_item(table, key, updates)
    }

    fn delete_item(&self, table: &str, key: Record) -> std::result::Result<(), StoreError> {
        (**self).delete_item(table, key)
    }

    fn get_item(
        &self,
        table: &str,
        key: Record,
    ) -> std::result::Result<Option<Record>, StoreError> {
        (**self).get_item(table, key)
    }

    fn query(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> std::result::Result<ResponsePage, StoreError> {
        (**self).query(table, options)
    }

    fn scan(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> std::result::Result<ResponsePage, StoreError> {
        (**self).scan(table, options)
    }

    fn describe_table(&self, table: &str) -> std::result::Result<TableDescription, StoreError> {
        (**self).describe_table(table)
    }
}
