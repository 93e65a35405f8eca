//! In-memory store
//!
//! A [`StoreClient`] that keeps tables in process memory and evaluates key
//! conditions, filters, projections, limits and ordering the way a
//! DynamoDB-style store does, paging results with continuation tokens.

pub mod deadline;
mod eval;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::core::{
    AttributeAction, AttributeUpdates, AttributeValue, ComparisonOperator, ConditionalOperator,
    IndexDescription, IndexProjection, KeySchema, QueryOptions, Record, ResponsePage, Select,
    StoreClient, StoreError, TableDescription,
};
use crate::translator;

pub use deadline::Deadline;

/// Default number of items a single page evaluates
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Table data structure
struct TableData {
    description: TableDescription,
    key_schema: KeySchema,
    rows: DashMap<String, Record>,
}

/// Resolved target of a read: the table itself or one of its indexes
struct ReadTarget<'a> {
    key_schema: KeySchema,
    index: Option<&'a IndexDescription>,
    global: bool,
}

/// Item waiting to be paged, with its position in index order
struct Candidate {
    sort_value: Option<AttributeValue>,
    key: String,
    record: Record,
}

/// Call counters, one per store operation
#[derive(Debug, Default)]
struct Counters {
    puts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    gets: AtomicU64,
    queries: AtomicU64,
    scans: AtomicU64,
    describes: AtomicU64,
}

/// Snapshot of store call counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub puts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub gets: u64,
    pub queries: u64,
    pub scans: u64,
    pub describes: u64,
}

/// In-process DynamoDB-style store
///
/// # Example
///
/// ```rust
/// use lumadb_mapper::core::{KeySchemaElement, TableDescription};
/// use lumadb_mapper::storage::MemoryStore;
///
/// let store = MemoryStore::new().with_page_size(2);
/// store.create_table(TableDescription::new(
///     "test_users",
///     vec![KeySchemaElement::hash("id")],
/// ))?;
/// assert_eq!(store.list_tables(), vec!["test_users".to_string()]);
/// # Ok::<(), lumadb_mapper::core::StoreError>(())
/// ```
pub struct MemoryStore {
    tables: DashMap<String, Arc<TableData>>,
    page_size: usize,
    latency: Option<Duration>,
    failure: Mutex<Option<(usize, StoreError)>>,
    counters: Counters,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing in-memory store");
        Self {
            tables: DashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
            failure: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Cap the number of items a single page evaluates
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay every call, to exercise time budgets
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the call made after `calls` further successful calls
    pub fn inject_failure(&self, calls: usize, error: StoreError) {
        *self.failure.lock() = Some((calls, error));
    }

    /// Call counts so far
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            puts: c.puts.load(AtomicOrdering::Relaxed),
            updates: c.updates.load(AtomicOrdering::Relaxed),
            deletes: c.deletes.load(AtomicOrdering::Relaxed),
            gets: c.gets.load(AtomicOrdering::Relaxed),
            queries: c.queries.load(AtomicOrdering::Relaxed),
            scans: c.scans.load(AtomicOrdering::Relaxed),
            describes: c.describes.load(AtomicOrdering::Relaxed),
        }
    }

    /// Create a table from its description
    pub fn create_table(&self, description: TableDescription) -> Result<(), StoreError> {
        let name = description.table_name.clone();
        if self.tables.contains_key(&name) {
            return Err(StoreError::Validation(format!("Table already exists: {name}")));
        }

        let key_schema = KeySchema::from_elements(&description.key_schema)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        for index in description
            .local_secondary_indexes
            .iter()
            .chain(&description.global_secondary_indexes)
        {
            KeySchema::from_elements(&index.key_schema).map_err(|e| {
                StoreError::Validation(format!("index {}: {e}", index.index_name))
            })?;
        }

        self.tables.insert(
            name.clone(),
            Arc::new(TableData {
                description,
                key_schema,
                rows: DashMap::new(),
            }),
        );

        info!("Created table: {}", name);
        Ok(())
    }

    /// Drop a table and its items
    pub fn delete_table(&self, name: &str) {
        self.tables.remove(name);
        info!("Deleted table: {}", name);
    }

    /// Names of all tables, sorted
    #[must_use]
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of items in a table
    pub fn item_count(&self, table: &str) -> Result<usize, StoreError> {
        Ok(self.table(table)?.rows.len())
    }

    fn table(&self, name: &str) -> Result<Arc<TableData>, StoreError> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| {
                StoreError::ResourceNotFound(format!(
                    "Requested resource not found: Table: {name} not found"
                ))
            })
    }

    /// Simulated latency and injected failures, applied before every call
    fn before_call(&self, counter: &AtomicU64) -> Result<(), StoreError> {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let mut failure = self.failure.lock();
        match failure.take() {
            Some((0, error)) => {
                warn!(code = error.dynamodb_code(), "Injected store failure");
                Err(error)
            }
            Some((n, error)) => {
                *failure = Some((n - 1, error));
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Canonical row key for the table's primary key attributes
    fn row_key(key_schema: &KeySchema, record: &Record) -> Result<String, StoreError> {
        let mut parts = Vec::with_capacity(key_schema.len());
        for name in key_schema.attribute_names() {
            let value = record.get(name).ok_or_else(|| {
                StoreError::Validation(format!(
                    "One of the required keys was not given a value: {name}"
                ))
            })?;
            if !matches!(value, AttributeValue::S(_) | AttributeValue::N(_) | AttributeValue::B(_))
                || value.is_empty()
            {
                return Err(StoreError::Validation(format!(
                    "Invalid key value for '{name}': {}",
                    value.type_name()
                )));
            }
            parts.push(format!("{name}={}", translator::attribute_value_to_json(value)));
        }
        Ok(parts.join("|"))
    }

    /// Row key for a request key, which must hold exactly the key attributes
    fn request_key(key_schema: &KeySchema, key: &Record) -> Result<String, StoreError> {
        if key.len() != key_schema.len() || key.keys().any(|k| !key_schema.contains(k)) {
            return Err(StoreError::Validation(
                "The provided key element does not match the schema".into(),
            ));
        }
        Self::row_key(key_schema, key)
    }

    fn read_target<'a>(
        table: &'a TableData,
        index_name: Option<&str>,
    ) -> Result<ReadTarget<'a>, StoreError> {
        let Some(name) = index_name else {
            return Ok(ReadTarget {
                key_schema: table.key_schema.clone(),
                index: None,
                global: false,
            });
        };

        let description = &table.description;
        let global = description
            .global_secondary_indexes
            .iter()
            .any(|i| i.index_name == name);
        let index = description.index(name).ok_or_else(|| {
            StoreError::Validation(format!(
                "The table does not have the specified index: {name}"
            ))
        })?;
        let key_schema = KeySchema::from_elements(&index.key_schema)
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        Ok(ReadTarget {
            key_schema,
            index: Some(index),
            global,
        })
    }

    fn validate_key_conditions(
        key_schema: &KeySchema,
        options: &QueryOptions,
    ) -> Result<(), StoreError> {
        let conditions = &options.key_conditions;
        if conditions.is_empty() {
            return Err(StoreError::Validation(
                "Either the KeyConditions or KeyConditionExpression parameter must be specified"
                    .into(),
            ));
        }

        for (name, condition) in conditions {
            eval::validate(name, condition)?;
            let op = condition.comparison_operator;
            let allowed = match key_schema.key_type(name) {
                Some(crate::core::KeyType::Hash) => op == ComparisonOperator::Eq,
                Some(crate::core::KeyType::Range) => matches!(
                    op,
                    ComparisonOperator::Eq
                        | ComparisonOperator::Le
                        | ComparisonOperator::Lt
                        | ComparisonOperator::Ge
                        | ComparisonOperator::Gt
                        | ComparisonOperator::BeginsWith
                        | ComparisonOperator::Between
                ),
                None => {
                    return Err(StoreError::Validation(format!(
                        "Query key condition not supported: '{name}' is not a key attribute"
                    )))
                }
            };
            if !allowed {
                return Err(StoreError::Validation(format!(
                    "Unsupported operator {op} on key attribute '{name}'"
                )));
            }
        }

        if !conditions.contains_key(key_schema.hash_key()) {
            return Err(StoreError::Validation(format!(
                "Query condition missed key schema element: {}",
                key_schema.hash_key()
            )));
        }
        Ok(())
    }

    /// Keep only the attributes an index projects
    fn project_index(
        table_keys: &KeySchema,
        target: &ReadTarget<'_>,
        record: Record,
    ) -> Record {
        let Some(index) = target.index else {
            return record;
        };
        let keep = |name: &str| {
            table_keys.contains(name)
                || target.key_schema.contains(name)
                || match &index.projection {
                    IndexProjection::All => true,
                    IndexProjection::KeysOnly => false,
                    IndexProjection::Include(names) => names.iter().any(|n| n == name),
                }
        };
        record.into_iter().filter(|(name, _)| keep(name.as_str())).collect()
    }

    fn compare(a: &Candidate, b: &Candidate) -> Ordering {
        let by_value = match (&a.sort_value, &b.sort_value) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        };
        by_value.then_with(|| a.key.cmp(&b.key))
    }

    /// Shared query/scan execution
    fn read(&self, table: &str, options: &QueryOptions, query: bool) -> Result<ResponsePage, StoreError> {
        let table_data = self.table(table)?;
        let target = Self::read_target(&table_data, options.index_name.as_deref())?;

        if target.global && options.consistent_read == Some(true) {
            return Err(StoreError::Validation(
                "Consistent reads are not supported on global secondary indexes".into(),
            ));
        }

        let filter = if query {
            Self::validate_key_conditions(&target.key_schema, options)?;
            &options.query_filter
        } else {
            &options.scan_filter
        };
        for (name, condition) in filter {
            eval::validate(name, condition)?;
        }

        let sort_attribute = if query {
            target.key_schema.range_key()
        } else {
            None
        };

        let mut candidates: Vec<Candidate> = table_data
            .rows
            .iter()
            .filter(|row| {
                target
                    .key_schema
                    .attribute_names()
                    .all(|name| row.value().contains_key(name))
            })
            .filter(|row| {
                !query || eval::matches_all(row.value(), &options.key_conditions, false)
            })
            .map(|row| Candidate {
                sort_value: sort_attribute.and_then(|name| row.value().get(name).cloned()),
                key: row.key().clone(),
                record: row.value().clone(),
            })
            .collect();

        let forward = options.scan_index_forward.unwrap_or(true);
        candidates.sort_by(Self::compare);
        if !forward {
            candidates.reverse();
        }

        if let Some(start) = &options.exclusive_start_key {
            let start = Candidate {
                sort_value: sort_attribute.and_then(|name| start.get(name).cloned()),
                key: Self::row_key(&table_data.key_schema, start)?,
                record: Record::new(),
            };
            let past = if forward { Ordering::Greater } else { Ordering::Less };
            candidates.retain(|c| Self::compare(c, &start) == past);
        }

        let budget = options
            .limit
            .map_or(self.page_size, |limit| limit.min(self.page_size))
            .max(1);
        let any = options.conditional_operator == Some(ConditionalOperator::Or);
        let count_only = options.select == Some(Select::Count);
        let has_more = candidates.len() > budget;

        let mut items = Vec::new();
        let mut count = 0;
        let mut scanned_count = 0;
        let mut last_key = None;

        for candidate in candidates.into_iter().take(budget) {
            scanned_count += 1;
            let record = Self::project_index(&table_data.key_schema, &target, candidate.record);
            if has_more && scanned_count == budget {
                let mut key = table_data.key_schema.extract(&record);
                key.extend(target.key_schema.extract(&record));
                last_key = Some(key);
            }

            if !eval::matches_all(&record, filter, any) {
                continue;
            }
            count += 1;
            if count_only {
                continue;
            }
            items.push(match &options.attributes_to_get {
                Some(names) => record
                    .into_iter()
                    .filter(|(name, _)| names.contains(name))
                    .collect(),
                None => record,
            });
        }

        debug!(
            table,
            count,
            scanned_count,
            more = last_key.is_some(),
            "{} page evaluated",
            if query { "Query" } else { "Scan" }
        );

        Ok(ResponsePage {
            count,
            scanned_count,
            items: if count_only { None } else { Some(items) },
            last_evaluated_key: last_key,
        })
    }
}

impl StoreClient for MemoryStore {
    #[instrument(skip(self, item))]
    fn put_item(&self, table: &str, item: Record) -> Result<(), StoreError> {
        self.before_call(&self.counters.puts)?;
        let table_data = self.table(table)?;
        let key = Self::row_key(&table_data.key_schema, &item)?;
        table_data.rows.insert(key, item);
        Ok(())
    }

    #[instrument(skip(self, key, updates))]
    fn update_item(
        &self,
        table: &str,
        key: Record,
        updates: AttributeUpdates,
    ) -> Result<(), StoreError> {
        self.before_call(&self.counters.updates)?;
        let table_data = self.table(table)?;
        let row_key = Self::request_key(&table_data.key_schema, &key)?;

        if let Some(name) = updates.keys().find(|name| table_data.key_schema.contains(name)) {
            return Err(StoreError::Validation(format!(
                "Cannot update attribute {name}. This attribute is part of the key"
            )));
        }

        let mut row = table_data.rows.entry(row_key).or_insert(key);
        for (name, update) in updates {
            match (update.action, update.value) {
                (AttributeAction::Put, Some(value)) => {
                    row.insert(name, value);
                }
                (AttributeAction::Put, None) => {
                    return Err(StoreError::Validation(format!(
                        "PUT update for '{name}' needs a value"
                    )))
                }
                (AttributeAction::Delete, _) => {
                    row.remove(&name);
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self, key))]
    fn delete_item(&self, table: &str, key: Record) -> Result<(), StoreError> {
        self.before_call(&self.counters.deletes)?;
        let table_data = self.table(table)?;
        let row_key = Self::request_key(&table_data.key_schema, &key)?;
        table_data.rows.remove(&row_key);
        Ok(())
    }

    #[instrument(skip(self, key))]
    fn get_item(&self, table: &str, key: Record) -> Result<Option<Record>, StoreError> {
        self.before_call(&self.counters.gets)?;
        let table_data = self.table(table)?;
        let row_key = Self::request_key(&table_data.key_schema, &key)?;
        Ok(table_data.rows.get(&row_key).map(|r| r.value().clone()))
    }

    #[instrument(skip(self, options))]
    fn query(&self, table: &str, options: &QueryOptions) -> Result<ResponsePage, StoreError> {
        self.before_call(&self.counters.queries)?;
        self.read(table, options, true)
    }

    #[instrument(skip(self, options))]
    fn scan(&self, table: &str, options: &QueryOptions) -> Result<ResponsePage, StoreError> {
        self.before_call(&self.counters.scans)?;
        self.read(table, options, false)
    }

    #[instrument(skip(self))]
    fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError> {
        self.before_call(&self.counters.describes)?;
        Ok(self.table(table)?.description.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AttributeUpdate, Condition, KeySchemaElement};

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table(
                TableDescription::new(
                    "devices",
                    vec![KeySchemaElement::hash("uuid"), KeySchemaElement::range("created_at")],
                )
                .with_global_index(
                    IndexDescription::new("by_owner", vec![KeySchemaElement::hash("owner")])
                        .with_projection(IndexProjection::KeysOnly),
                ),
            )
            .unwrap();
        store
    }

    fn device(uuid: &str, created_at: i64) -> Record {
        let mut r = Record::new();
        r.insert("uuid".into(), AttributeValue::from(uuid));
        r.insert("created_at".into(), AttributeValue::from(created_at));
        r
    }

    fn eq(value: impl Into<AttributeValue>) -> Condition {
        Condition::new(ComparisonOperator::Eq, Some(vec![value.into()]))
    }

    #[test]
    fn test_kv_operations() {
        let store = store();
        store.put_item("devices", device("a", 1)).unwrap();

        let found = store.get_item("devices", device("a", 1)).unwrap();
        assert!(found.is_some());

        store.delete_item("devices", device("a", 1)).unwrap();
        assert!(store.get_item("devices", device("a", 1)).unwrap().is_none());
    }

    #[test]
    fn test_missing_table() {
        let err = store().get_item("nope", device("a", 1)).unwrap_err();
        assert_eq!(err.dynamodb_code(), "ResourceNotFoundException");
    }

    #[test]
    fn test_key_must_match_schema() {
        let store = store();
        let mut key = Record::new();
        key.insert("uuid".into(), AttributeValue::from("a"));
        assert!(matches!(store.get_item("devices", key), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_update_put_and_delete() {
        let store = store();
        let mut item = device("a", 1);
        item.insert("name".into(), AttributeValue::from("phone"));
        store.put_item("devices", item).unwrap();

        let mut updates = AttributeUpdates::new();
        updates.insert("name".into(), AttributeUpdate::delete());
        updates.insert("color".into(), AttributeUpdate::put(AttributeValue::from("red")));
        store.update_item("devices", device("a", 1), updates).unwrap();

        let row = store.get_item("devices", device("a", 1)).unwrap().unwrap();
        assert!(!row.contains_key("name"));
        assert_eq!(row.get("color"), Some(&AttributeValue::from("red")));

        let mut updates = AttributeUpdates::new();
        updates.insert("uuid".into(), AttributeUpdate::put(AttributeValue::from("b")));
        assert!(store.update_item("devices", device("a", 1), updates).is_err());
    }

    #[test]
    fn test_query_orders_by_range_key_and_pages() {
        let store = store().with_page_size(2);
        for t in [3, 1, 2] {
            store.put_item("devices", device("a", t)).unwrap();
        }
        store.put_item("devices", device("b", 9)).unwrap();

        let mut options = QueryOptions::default();
        options.key_conditions.insert("uuid".into(), eq("a"));

        let page = store.query("devices", &options).unwrap();
        let times: Vec<_> = page
            .items
            .unwrap()
            .iter()
            .map(|r| r["created_at"].as_number().unwrap().as_i64())
            .collect();
        assert_eq!(times, vec![1, 2]);
        assert!(page.last_evaluated_key.is_some());

        options.exclusive_start_key = page.last_evaluated_key;
        let page = store.query("devices", &options).unwrap();
        assert_eq!(page.count, 1);
        assert!(page.last_evaluated_key.is_none());

        options.exclusive_start_key = None;
        options.scan_index_forward = Some(false);
        let page = store.query("devices", &options).unwrap();
        assert_eq!(page.items.unwrap()[0]["created_at"], AttributeValue::from(3_i64));
    }

    #[test]
    fn test_query_requires_hash_equality() {
        let store = store();
        let mut options = QueryOptions::default();
        options
            .key_conditions
            .insert("created_at".into(), eq(1_i64));
        assert!(matches!(store.query("devices", &options), Err(StoreError::Validation(_))));

        let options = QueryOptions::default();
        assert!(store.query("devices", &options).is_err());
    }

    #[test]
    fn test_sparse_keys_only_index() {
        let store = store();
        let mut owned = device("a", 1);
        owned.insert("owner".into(), AttributeValue::from("jane"));
        owned.insert("name".into(), AttributeValue::from("phone"));
        store.put_item("devices", owned).unwrap();
        store.put_item("devices", device("b", 2)).unwrap();

        let mut options = QueryOptions::default();
        options.index_name = Some("by_owner".into());
        options.key_conditions.insert("owner".into(), eq("jane"));

        let page = store.query("devices", &options).unwrap();
        let items = page.items.unwrap();
        assert_eq!(items.len(), 1);
        assert!(!items[0].contains_key("name"));
        assert!(items[0].contains_key("created_at"));

        options.consistent_read = Some(true);
        assert!(store.query("devices", &options).is_err());
    }

    #[test]
    fn test_scan_count_and_projection() {
        let store = store();
        for (uuid, t) in [("a", 1), ("b", 2), ("c", 3)] {
            store.put_item("devices", device(uuid, t)).unwrap();
        }

        let mut options = QueryOptions {
            select: Some(Select::Count),
            ..QueryOptions::default()
        };
        options.scan_filter.insert(
            "created_at".into(),
            Condition::new(ComparisonOperator::Ge, Some(vec![AttributeValue::from(2_i64)])),
        );
        let page = store.scan("devices", &options).unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.scanned_count, 3);
        assert!(page.items.is_none());

        let options = QueryOptions {
            select: Some(Select::SpecificAttributes),
            attributes_to_get: Some(vec!["uuid".into()]),
            ..QueryOptions::default()
        };
        let page = store.scan("devices", &options).unwrap();
        assert!(page.items.unwrap().iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_injected_failure_and_stats() {
        let store = store();
        store.inject_failure(1, StoreError::ThroughputExceeded("slow down".into()));

        assert!(store.describe_table("devices").is_ok());
        assert!(matches!(
            store.describe_table("devices"),
            Err(StoreError::ThroughputExceeded(_))
        ));
        assert!(store.describe_table("devices").is_ok());
        assert_eq!(store.stats().describes, 3);
    }
}
