//! Query builder
//!
//! A [`Query`] accumulates conditions and directives and decides between a
//! store `scan` and a store `query`. Nothing touches the store until the
//! query is materialized with [`Query::all`], [`Query::iter`],
//! [`Query::each`] or [`Query::count`].
//!
//! ## Routing
//!
//! A query starts as a scan. It becomes a query, for good, when a condition
//! names a key attribute of the active index, or when sort order, consistent
//! reads or an index are requested. Conditions on key attributes go to
//! `key_conditions`; other conditions go to `scan_filter` while scanning and
//! to `query_filter` afterwards. Filters collected while scanning move over
//! on the switch.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use lumadb_mapper::{Adapter, AttributeType, Document, Mapper, Schema};
//! # use lumadb_mapper::core::{KeySchemaElement, TableDescription};
//! # use lumadb_mapper::storage::MemoryStore;
//! # use lumadb_mapper::query::Operation;
//! # let store = Arc::new(MemoryStore::new());
//! # store.create_table(TableDescription::new(
//! #     "purchases",
//! #     vec![KeySchemaElement::hash("region"), KeySchemaElement::range("created_at")],
//! # ))?;
//! # let schema = Schema::builder()
//! #     .attribute("id", AttributeType::String)
//! #     .attribute("region", AttributeType::String)
//! #     .attribute("subtotal", AttributeType::Float)
//! #     .identity("id")
//! #     .build()?;
//! # let adapter = Adapter::new(store, Mapper::new().collection("purchases", schema))?;
//! let scan = adapter.query::<Document>("purchases")?.filter("subtotal", 100.0)?;
//! assert_eq!(scan.operation(), Operation::Scan);
//!
//! let query = scan.filter("region", "europe")?;
//! assert_eq!(query.operation(), Operation::Query);
//! # Ok::<(), lumadb_mapper::MapperError>(())
//! ```

use std::marker::PhantomData;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{debug, trace, warn};

use crate::coercer::Coercer;
use crate::collection::Collection;
use crate::core::{
    AttributeValue, ComparisonOperator, Condition, ConditionalOperator, QueryOptions, Record,
    ResponsePage, Select,
};
use crate::error::{MapperError, Result};
use crate::translator;
use crate::value::{Entity, Value};

/// Store operation a query runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Scan,
    Query,
}

/// Right-hand side of an inferred condition.
///
/// Lists infer `IN`, inclusive ranges infer `BETWEEN`, anything else `EQ`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    Range(Value, Value),
}

macro_rules! scalar_operand {
    ($($ty:ty),+ $(,)?) => {
        $(impl From<$ty> for Operand {
            fn from(v: $ty) -> Self {
                Operand::Value(v.into())
            }
        })+
    };
}

scalar_operand!(
    Value,
    &str,
    String,
    bool,
    i32,
    i64,
    f64,
    NaiveDate,
    DateTime<FixedOffset>,
    DateTime<Utc>,
);

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(v: Vec<T>) -> Self {
        Operand::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(v: [T; N]) -> Self {
        Operand::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<RangeInclusive<T>> for Operand {
    fn from(v: RangeInclusive<T>) -> Self {
        let (low, high) = v.into_inner();
        Operand::Range(low.into(), high.into())
    }
}

/// Which condition group a condition lands in
#[derive(Debug, Clone, Copy)]
enum Group {
    Key,
    ScanFilter,
    QueryFilter,
}

/// Lazily evaluated, chainable query over one collection.
///
/// Builder methods consume and return the query. Materializing borrows it,
/// so the same query can be run again.
pub struct Query<E> {
    collection: Arc<Collection>,
    coercer: Arc<Coercer>,
    operation: Operation,
    options: QueryOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            coercer: Arc::clone(&self.coercer),
            operation: self.operation,
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.collection.name())
            .field("operation", &self.operation)
            .field("options", &self.options)
            .finish()
    }
}

impl<E: Entity> Query<E> {
    /// Start a scan over a collection
    pub fn new(collection: Arc<Collection>, coercer: Arc<Coercer>) -> Self {
        Self {
            collection,
            coercer,
            operation: Operation::Scan,
            options: QueryOptions::default(),
            _entity: PhantomData,
        }
    }

    /// Current store operation
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Accumulated request options
    #[must_use]
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    // ===== Routing =====

    fn upgrade(&mut self) {
        if self.operation == Operation::Query {
            return;
        }
        debug!(table = self.collection.name(), "Switching scan to query");
        self.operation = Operation::Query;
        let mut scan_filter = std::mem::take(&mut self.options.scan_filter);
        self.options.query_filter.append(&mut scan_filter);
    }

    fn add_condition(
        mut self,
        attribute: &str,
        operator: ComparisonOperator,
        operands: Option<Vec<Value>>,
    ) -> Result<Self> {
        let physical = self.coercer.schema().physical_name(attribute).to_string();
        let index = self.options.index_name.clone();

        let group = if self.collection.is_key(&physical, index.as_deref())? {
            self.upgrade();
            Group::Key
        } else if self.operation == Operation::Scan {
            Group::ScanFilter
        } else {
            Group::QueryFilter
        };

        let values = operands
            .map(|values| {
                values
                    .iter()
                    .map(|v| {
                        self.coercer
                            .coerce_value(attribute, v)?
                            .ok_or_else(|| MapperError::coercion(attribute, "a value", v.type_name()))
                    })
                    .collect::<Result<Vec<AttributeValue>>>()
            })
            .transpose()?;

        let conditions = match group {
            Group::Key => &mut self.options.key_conditions,
            Group::ScanFilter => &mut self.options.scan_filter,
            Group::QueryFilter => &mut self.options.query_filter,
        };
        trace!(attribute = %physical, operator = %operator, ?group, "Adding condition");
        conditions.insert(physical, Condition::new(operator, values));
        Ok(self)
    }

    fn infer(self, attribute: &str, operand: Operand, negate: bool) -> Result<Self> {
        match (operand, negate) {
            (Operand::Value(v), false) => {
                self.add_condition(attribute, ComparisonOperator::Eq, Some(vec![v]))
            }
            (Operand::Value(v), true) => {
                self.add_condition(attribute, ComparisonOperator::Ne, Some(vec![v]))
            }
            (Operand::List(values), false) => {
                self.add_condition(attribute, ComparisonOperator::In, Some(values))
            }
            (Operand::Range(low, high), false) => {
                self.add_condition(attribute, ComparisonOperator::Between, Some(vec![low, high]))
            }
            (Operand::List(_), true) => Err(MapperError::UnsupportedOperation("exclude with a list")),
            (Operand::Range(..), true) => {
                Err(MapperError::UnsupportedOperation("exclude with a range"))
            }
        }
    }

    // ===== Conditions =====

    /// Add a condition, inferring the operator from the operand
    pub fn filter(self, attribute: &str, operand: impl Into<Operand>) -> Result<Self> {
        self.infer(attribute, operand.into(), false)
    }

    /// Alias of [`Query::filter`]
    pub fn eq(self, attribute: &str, operand: impl Into<Operand>) -> Result<Self> {
        self.filter(attribute, operand)
    }

    /// Add a negated condition; only scalar operands can be negated
    pub fn exclude(self, attribute: &str, operand: impl Into<Operand>) -> Result<Self> {
        self.infer(attribute, operand.into(), true)
    }

    /// Alias of [`Query::exclude`]
    pub fn ne(self, attribute: &str, operand: impl Into<Operand>) -> Result<Self> {
        self.exclude(attribute, operand)
    }

    /// Attribute equals one of the values
    pub fn is_in<I>(self, attribute: &str, values: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_condition(attribute, ComparisonOperator::In, Some(values))
    }

    /// Attribute lies within `low..=high`
    pub fn between(
        self,
        attribute: &str,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Result<Self> {
        let values = vec![low.into(), high.into()];
        self.add_condition(attribute, ComparisonOperator::Between, Some(values))
    }

    pub fn le(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::Le, Some(vec![value.into()]))
    }

    pub fn lt(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::Lt, Some(vec![value.into()]))
    }

    pub fn ge(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::Ge, Some(vec![value.into()]))
    }

    pub fn gt(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::Gt, Some(vec![value.into()]))
    }

    /// Substring of a string attribute, or member of a set attribute
    pub fn contains(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::Contains, Some(vec![value.into()]))
    }

    pub fn not_contains(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(
            attribute,
            ComparisonOperator::NotContains,
            Some(vec![value.into()]),
        )
    }

    pub fn begins_with(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::BeginsWith, Some(vec![value.into()]))
    }

    /// Attribute is absent
    pub fn null(self, attribute: &str) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::Null, None)
    }

    /// Attribute is present
    pub fn not_null(self, attribute: &str) -> Result<Self> {
        self.add_condition(attribute, ComparisonOperator::NotNull, None)
    }

    // ===== Directives =====

    /// Return only the given attributes
    #[must_use]
    pub fn select<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let schema = self.coercer.schema();
        let names = attributes
            .into_iter()
            .map(|a| schema.physical_name(a.as_ref()).to_string())
            .collect();
        self.options.select = Some(Select::SpecificAttributes);
        self.options.attributes_to_get = Some(names);
        self
    }

    /// Evaluate at most `n` items, in a single page
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.options.limit = Some(n);
        self
    }

    /// Combine the filter conditions with OR; key conditions stay AND-ed
    #[must_use]
    pub fn or(mut self) -> Self {
        self.options.conditional_operator = Some(ConditionalOperator::Or);
        self
    }

    /// Ascending range key order
    #[must_use]
    pub fn asc(mut self) -> Self {
        self.upgrade();
        self.options.scan_index_forward = Some(true);
        self
    }

    /// Alias of [`Query::asc`]
    #[must_use]
    pub fn order(self) -> Self {
        self.asc()
    }

    /// Descending range key order
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.upgrade();
        self.options.scan_index_forward = Some(false);
        self
    }

    /// Ascending order; results can only be ordered by the range key, so
    /// the columns are ignored
    #[must_use]
    pub fn order_by<I>(self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self::warn_columns(columns);
        self.asc()
    }

    /// Descending order; the columns are ignored like in [`Query::order_by`]
    #[must_use]
    pub fn desc_by<I>(self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self::warn_columns(columns);
        self.desc()
    }

    fn warn_columns<I>(columns: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let columns: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        if !columns.is_empty() {
            warn!(?columns, "Results can only be ordered by the range key");
        }
    }

    /// Strongly consistent reads
    #[must_use]
    pub fn consistent(mut self) -> Self {
        self.upgrade();
        self.options.consistent_read = Some(true);
        self
    }

    /// Read from a secondary index.
    ///
    /// Conditions already added are regrouped against the index key schema.
    pub fn index(mut self, name: &str) -> Result<Self> {
        let key_schema = self.collection.key_schema(Some(name))?;
        self.upgrade();
        self.options.index_name = Some(name.to_string());

        let keys = std::mem::take(&mut self.options.key_conditions);
        let filters = std::mem::take(&mut self.options.query_filter);
        for (attribute, condition) in keys.into_iter().chain(filters) {
            let group = if key_schema.contains(&attribute) {
                &mut self.options.key_conditions
            } else {
                &mut self.options.query_filter
            };
            group.insert(attribute, condition);
        }
        Ok(self)
    }

    /// Apply a block of builder steps
    pub fn configure(self, f: impl FnOnce(Self) -> Result<Self>) -> Result<Self> {
        f(self)
    }

    // ===== Unsupported =====

    pub fn offset(self, _n: usize) -> Result<Self> {
        Err(MapperError::UnsupportedOperation("offset"))
    }

    pub fn negate(self) -> Result<Self> {
        Err(MapperError::UnsupportedOperation("negate"))
    }

    pub fn sum(&self, _column: &str) -> Result<Value> {
        Err(MapperError::UnsupportedOperation("sum"))
    }

    pub fn average(&self, _column: &str) -> Result<Value> {
        Err(MapperError::UnsupportedOperation("average"))
    }

    pub fn avg(&self, column: &str) -> Result<Value> {
        self.average(column)
    }

    pub fn min(&self, _column: &str) -> Result<Value> {
        Err(MapperError::UnsupportedOperation("min"))
    }

    pub fn max(&self, _column: &str) -> Result<Value> {
        Err(MapperError::UnsupportedOperation("max"))
    }

    pub fn interval(&self, _column: &str) -> Result<Value> {
        Err(MapperError::UnsupportedOperation("interval"))
    }

    pub fn range(&self, _column: &str) -> Result<Value> {
        Err(MapperError::UnsupportedOperation("range"))
    }

    // ===== Materialization =====

    /// Run the query and collect every entity across all pages
    pub fn all(&self) -> Result<Vec<E>> {
        self.iter().collect()
    }

    /// Lazily iterate over the results, fetching one page at a time
    #[must_use]
    pub fn iter(&self) -> QueryIter<E> {
        QueryIter {
            collection: Arc::clone(&self.collection),
            coercer: Arc::clone(&self.coercer),
            operation: self.operation,
            options: self.options.clone(),
            buffer: Vec::new().into_iter(),
            done: false,
            _entity: PhantomData,
        }
    }

    /// Call `f` with each entity; returns how many were seen
    pub fn each(&self, mut f: impl FnMut(E)) -> Result<usize> {
        let mut seen = 0;
        for entity in self.iter() {
            f(entity?);
            seen += 1;
        }
        Ok(seen)
    }

    /// Count matching items across all pages
    pub fn count(&self) -> Result<usize> {
        let mut options = self.options.clone();
        options.select = Some(Select::Count);
        options.attributes_to_get = None;

        let mut total = 0;
        loop {
            let page = run(&self.collection, self.operation, &options)?;
            total += page.count;
            match page.last_evaluated_key {
                Some(key) if options.limit.is_none() => options.exclusive_start_key = Some(key),
                _ => return Ok(total),
            }
        }
    }

    /// At least one item matches
    pub fn exists(&self) -> Result<bool> {
        Ok(self.count()? != 0)
    }

    /// No item matches
    pub fn is_empty(&self) -> Result<bool> {
        Ok(!self.exists()?)
    }
}

fn run(collection: &Collection, operation: Operation, options: &QueryOptions) -> Result<ResponsePage> {
    trace!(request = %translator::options_to_request(collection.name(), options), "Store request");
    let page = match operation {
        Operation::Scan => collection.scan(options)?,
        Operation::Query => collection.query(options)?,
    };
    debug!(
        table = collection.name(),
        ?operation,
        count = page.count,
        more = page.last_evaluated_key.is_some(),
        "Page received"
    );
    Ok(page)
}

/// Iterator over query results, fetching pages on demand.
///
/// A failed fetch yields one `Err` and ends the iteration.
pub struct QueryIter<E> {
    collection: Arc<Collection>,
    coercer: Arc<Coercer>,
    operation: Operation,
    options: QueryOptions,
    buffer: std::vec::IntoIter<Record>,
    done: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> QueryIter<E> {
    fn fetch(&mut self) -> Result<()> {
        let page = run(&self.collection, self.operation, &self.options)?;
        self.buffer = page.items.unwrap_or_default().into_iter();
        match page.last_evaluated_key {
            Some(key) if self.options.limit.is_none() => {
                self.options.exclusive_start_key = Some(key);
            }
            _ => self.done = true,
        }
        Ok(())
    }
}

impl<E: Entity> Iterator for QueryIter<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.next() {
                return Some(
                    self.coercer
                        .record_to_entity(record)
                        .and_then(E::from_attributes),
                );
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
