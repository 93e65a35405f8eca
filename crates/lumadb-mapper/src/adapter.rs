//! Repository-facing facade
//!
//! A [`Mapper`] declares which collections exist and how they map onto
//! physical tables. An [`Adapter`] binds a mapper to a store client, builds
//! one coercer and one gateway per collection, and hands out commands and
//! queries by collection name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::coercer::Coercer;
use crate::collection::Collection;
use crate::command::Command;
use crate::config::Config;
use crate::core::StoreClient;
use crate::error::{MapperError, Result};
use crate::query::Query;
use crate::schema::Schema;
use crate::storage::Deadline;
use crate::value::{Document, Entity, Value};

// ===== Mapper =====

#[derive(Debug, Clone)]
struct Mapping {
    table: String,
    schema: Schema,
}

/// Declared collections and their physical tables
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    mappings: Vec<(String, Mapping)>,
    table_prefix: Option<String>,
}

impl Mapper {
    /// Create an empty mapper
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection stored in the table of the same name
    #[must_use]
    pub fn collection(self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        let table = name.clone();
        self.collection_as(name, table, schema)
    }

    /// Register a collection stored in an explicitly named table
    #[must_use]
    pub fn collection_as(
        mut self,
        name: impl Into<String>,
        table: impl Into<String>,
        schema: Schema,
    ) -> Self {
        let name = name.into();
        self.mappings.retain(|(existing, _)| *existing != name);
        self.mappings.push((
            name,
            Mapping {
                table: table.into(),
                schema,
            },
        ));
        self
    }

    /// Prefix every physical table name
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    /// Names of the registered collections, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mappings.iter().map(|(name, _)| name.as_str())
    }

    fn table_name(&self, mapping: &Mapping) -> String {
        match &self.table_prefix {
            Some(prefix) => format!("{prefix}{}", mapping.table),
            None => mapping.table.clone(),
        }
    }
}

// ===== Adapter =====

struct Bound {
    collection: Arc<Collection>,
    coercer: Arc<Coercer>,
}

/// Entry point for reading and writing entities.
///
/// # Thread Safety
///
/// Gateways and coercers are shared behind `Arc`s; commands and queries
/// handed out by the adapter can move to other threads.
pub struct Adapter {
    collections: HashMap<String, Bound>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.collections.keys().collect();
        names.sort();
        f.debug_struct("Adapter").field("collections", &names).finish()
    }
}

impl Adapter {
    /// Bind a mapper to a store client.
    ///
    /// Every schema is checked for supported types up front.
    pub fn new<C: StoreClient + 'static>(client: C, mapper: Mapper) -> Result<Self> {
        Self::bind(Arc::new(client), mapper)
    }

    /// Bind a mapper to a store client using file or default configuration.
    ///
    /// A configured table prefix overrides the mapper's own, and a configured
    /// request timeout wraps the client in a [`Deadline`].
    ///
    /// The deadline is checked after each call returns. A write reported as
    /// [`StoreError::Timeout`](crate::core::StoreError::Timeout) may already
    /// be applied, so retry creates and updates only when they are idempotent.
    pub fn from_config<C: StoreClient + 'static>(
        client: C,
        mut mapper: Mapper,
        config: &Config,
    ) -> Result<Self> {
        if let Some(prefix) = &config.table_prefix {
            mapper = mapper.table_prefix(prefix.clone());
        }
        debug!(api_version = %config.api_version, "Binding adapter");

        match config.request_timeout() {
            Some(budget) => Self::bind(Arc::new(Deadline::new(client, budget)), mapper),
            None => Self::bind(Arc::new(client), mapper),
        }
    }

    fn bind(client: Arc<dyn StoreClient>, mapper: Mapper) -> Result<Self> {
        let mut collections = HashMap::with_capacity(mapper.mappings.len());
        for (name, mapping) in &mapper.mappings {
            let table = mapper.table_name(mapping);
            let schema = Arc::new(mapping.schema.clone());
            let coercer = Arc::new(Coercer::new(Arc::clone(&schema))?);
            let collection = Arc::new(Collection::new(Arc::clone(&client), table, schema));
            debug!(collection = %name, table = collection.name(), "Registered collection");
            collections.insert(name.clone(), Bound { collection, coercer });
        }

        info!(collections = collections.len(), "Adapter ready");
        Ok(Self { collections })
    }

    fn bound(&self, collection: &str) -> Result<&Bound> {
        self.collections
            .get(collection)
            .ok_or_else(|| MapperError::CollectionNotFound(collection.to_string()))
    }

    /// Gateway of a collection
    pub fn collection(&self, collection: &str) -> Result<&Arc<Collection>> {
        Ok(&self.bound(collection)?.collection)
    }

    /// Command set of a collection
    pub fn command<E: Entity>(&self, collection: &str) -> Result<Command<E>> {
        let bound = self.bound(collection)?;
        Ok(Command::new(
            Arc::clone(&bound.collection),
            Arc::clone(&bound.coercer),
        ))
    }

    /// Fresh query over a collection
    pub fn query<E: Entity>(&self, collection: &str) -> Result<Query<E>> {
        let bound = self.bound(collection)?;
        Ok(Query::new(
            Arc::clone(&bound.collection),
            Arc::clone(&bound.coercer),
        ))
    }

    /// Fresh query over a collection, refined by `f`
    pub fn query_with<E: Entity>(
        &self,
        collection: &str,
        f: impl FnOnce(Query<E>) -> Result<Query<E>>,
    ) -> Result<Query<E>> {
        self.query(collection)?.configure(f)
    }

    /// Persist a new entity and assign its identity in place
    #[instrument(skip(self, entity))]
    pub fn create<E: Entity>(&self, collection: &str, entity: &mut E) -> Result<()> {
        let command = self.command::<E>(collection)?;
        let identity = command.create(entity)?;

        let attribute = self.bound(collection)?.coercer.schema().identity().name.clone();
        entity.set_identity(&attribute, identity);
        Ok(())
    }

    /// Persist an entity's current attributes
    #[instrument(skip(self, entity))]
    pub fn update<E: Entity>(&self, collection: &str, entity: &E) -> Result<()> {
        self.command::<E>(collection)?.update(entity)
    }

    /// Delete a stored entity
    #[instrument(skip(self, entity))]
    pub fn delete<E: Entity>(&self, collection: &str, entity: &E) -> Result<()> {
        self.command::<E>(collection)?.delete(entity)
    }

    /// Fetch an entity by key values, partition key first
    pub fn find<E: Entity>(&self, collection: &str, key: &[Value]) -> Result<Option<E>> {
        self.command::<E>(collection)?.get(key)
    }

    /// Delete every entity of a collection, returning how many were removed
    pub fn clear(&self, collection: &str) -> Result<usize> {
        self.command::<Document>(collection)?.clear()
    }

    /// Tables have no global order; always fails.
    pub fn first<E: Entity>(&self, _collection: &str) -> Result<Option<E>> {
        Err(MapperError::UnsupportedOperation("first"))
    }

    /// Tables have no global order; always fails.
    pub fn last<E: Entity>(&self, _collection: &str) -> Result<Option<E>> {
        Err(MapperError::UnsupportedOperation("last"))
    }
}
