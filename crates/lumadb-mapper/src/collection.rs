//! Collection gateway
//!
//! A [`Collection`] owns the handle to one physical table. It turns records
//! into store calls and resolves the table's key schemas, caching them for
//! its own lifetime.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::core::{
    AttributeUpdate, AttributeUpdates, AttributeValue, KeySchema, QueryOptions, Record,
    ResponsePage, StoreClient, TableDescription,
};
use crate::error::{MapperError, Result};
use crate::schema::Schema;

/// Gateway to one physical table.
///
/// # Thread Safety
///
/// Metadata is resolved at most once through a `OnceCell` and key schemas
/// are cached in a `DashMap`, so a collection can be shared across threads
/// behind an `Arc`.
pub struct Collection {
    client: Arc<dyn StoreClient>,
    name: String,
    schema: Arc<Schema>,
    description: OnceCell<TableDescription>,
    key_schemas: DashMap<Option<String>, KeySchema>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("resolved", &self.description.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Collection {
    /// Create a gateway for a table
    pub fn new(client: Arc<dyn StoreClient>, name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self {
            client,
            name: name.into(),
            schema,
            description: OnceCell::new(),
            key_schemas: DashMap::new(),
        }
    }

    /// Physical table name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema of the records stored in this table
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Physical name of the identity attribute
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.schema.identity().physical_name
    }

    /// Write a new record, generating its identity when missing.
    ///
    /// The identity used is written into `record` and returned.
    #[instrument(skip(self, record), fields(table = %self.name))]
    pub fn create(&self, record: &mut Record) -> Result<AttributeValue> {
        let identity = self.identity().to_string();
        let assigned = match record.get(&identity) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => {
                let generated = AttributeValue::S(Uuid::new_v4().to_string());
                record.insert(identity.clone(), generated.clone());
                debug!(identity = %identity, "Generated identity");
                generated
            }
        };

        self.client.put_item(&self.name, record.clone())?;
        Ok(assigned)
    }

    /// Update the stored record identified by the key attributes of `record`.
    ///
    /// Non-key schema attributes present in `record` are replaced; those
    /// absent from it are removed from the stored record. An absent identity
    /// leaves the stored one in place.
    #[instrument(skip(self, record), fields(table = %self.name))]
    pub fn update(&self, record: &Record) -> Result<()> {
        let key_schema = self.key_schema(None)?;
        let key = key_schema.extract(record);
        let identity = self.identity();

        let mut updates = AttributeUpdates::new();
        for attribute in self.schema.attributes() {
            let name = &attribute.physical_name;
            if key_schema.contains(name) {
                continue;
            }
            let update = match record.get(name) {
                Some(value) => AttributeUpdate::put(value.clone()),
                None if name == identity => continue,
                None => AttributeUpdate::delete(),
            };
            updates.insert(name.clone(), update);
        }
        for (name, value) in record {
            if !key_schema.contains(name) && !updates.contains_key(name) {
                updates.insert(name.clone(), AttributeUpdate::put(value.clone()));
            }
        }

        self.client.update_item(&self.name, key, updates)?;
        Ok(())
    }

    /// Delete the stored record identified by the key attributes of `record`
    #[instrument(skip(self, record), fields(table = %self.name))]
    pub fn delete(&self, record: &Record) -> Result<()> {
        let key = self.key_schema(None)?.extract(record);
        self.client.delete_item(&self.name, key)?;
        Ok(())
    }

    /// Fetch one record by its key values, partition key first.
    ///
    /// Returns `Ok(None)` without calling the store when a component is
    /// empty or the number of components differs from the key schema.
    #[instrument(skip(self, key), fields(table = %self.name))]
    pub fn get(&self, key: &[AttributeValue]) -> Result<Option<Record>> {
        if key.iter().any(AttributeValue::is_empty) {
            return Ok(None);
        }
        let key_schema = self.key_schema(None)?;
        if key.len() != key_schema.len() {
            debug!(given = key.len(), expected = key_schema.len(), "Key arity mismatch");
            return Ok(None);
        }

        let key: Record = key_schema
            .attribute_names()
            .map(str::to_string)
            .zip(key.iter().cloned())
            .collect();
        Ok(self.client.get_item(&self.name, key)?)
    }

    /// Run a query against the table or one of its indexes
    #[instrument(skip(self, options), fields(table = %self.name))]
    pub fn query(&self, options: &QueryOptions) -> Result<ResponsePage> {
        Ok(self.client.query(&self.name, options)?)
    }

    /// Run a scan against the table or one of its indexes
    #[instrument(skip(self, options), fields(table = %self.name))]
    pub fn scan(&self, options: &QueryOptions) -> Result<ResponsePage> {
        Ok(self.client.scan(&self.name, options)?)
    }

    /// Table metadata, fetched on first use.
    ///
    /// A failed fetch is not cached; the next call retries it.
    pub fn description(&self) -> Result<&TableDescription> {
        self.description.get_or_try_init(|| {
            debug!(table = %self.name, "Describing table");
            Ok(self.client.describe_table(&self.name)?)
        })
    }

    /// Key schema of the table (`None`) or of a secondary index
    pub fn key_schema(&self, index: Option<&str>) -> Result<KeySchema> {
        let cache_key = index.map(str::to_string);
        if let Some(cached) = self.key_schemas.get(&cache_key) {
            return Ok(cached.clone());
        }

        let description = self.description()?;
        let elements = match index {
            None => &description.key_schema,
            Some(name) => {
                &description
                    .index(name)
                    .ok_or_else(|| MapperError::IndexNotFound {
                        table: self.name.clone(),
                        index: name.to_string(),
                    })?
                    .key_schema
            }
        };

        let key_schema = KeySchema::from_elements(elements)?;
        self.key_schemas.insert(cache_key, key_schema.clone());
        Ok(key_schema)
    }

    /// Check whether a physical attribute is part of a key schema
    pub fn is_key(&self, attribute: &str, index: Option<&str>) -> Result<bool> {
        Ok(self.key_schema(index)?.contains(attribute))
    }
}
