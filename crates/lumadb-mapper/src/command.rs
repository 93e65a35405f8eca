//! Entity commands
//!
//! Glue between entity serialization and the collection gateway.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::coercer::Coercer;
use crate::collection::Collection;
use crate::core::{QueryOptions, Select};
use crate::error::Result;
use crate::value::{Entity, Value};

/// Create, update, delete and fetch entities of one collection.
pub struct Command<E> {
    collection: Arc<Collection>,
    coercer: Arc<Coercer>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Command<E> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            coercer: Arc::clone(&self.coercer),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Command<E> {
    pub fn new(collection: Arc<Collection>, coercer: Arc<Coercer>) -> Self {
        Self {
            collection,
            coercer,
            _entity: PhantomData,
        }
    }

    /// Persist a new entity and return the identity it was stored under.
    ///
    /// The entity itself is not modified; see
    /// [`Adapter::create`](crate::adapter::Adapter::create) for in-place
    /// assignment.
    pub fn create(&self, entity: &E) -> Result<Value> {
        let mut record = self.coercer.entity_to_record(&entity.to_attributes())?;
        let identity = self.collection.create(&mut record)?;

        let attribute = self.coercer.schema().identity();
        self.coercer.converter(&attribute.name).map_or_else(
            || Ok(Value::Null),
            |(_, converter)| converter.from_wire(&attribute.name, identity),
        )
    }

    /// Persist the entity's current attributes; unset attributes are removed
    pub fn update(&self, entity: &E) -> Result<()> {
        let record = self.coercer.entity_to_record(&entity.to_attributes())?;
        self.collection.update(&record)
    }

    /// Delete the stored entity
    pub fn delete(&self, entity: &E) -> Result<()> {
        let record = self.coercer.entity_to_record(&entity.to_attributes())?;
        self.collection.delete(&record)
    }

    /// Fetch an entity by key values, partition key first
    pub fn get(&self, key: &[Value]) -> Result<Option<E>> {
        let key_schema = self.collection.key_schema(None)?;
        if key.len() != key_schema.len() {
            return Ok(None);
        }

        let mut wire = Vec::with_capacity(key.len());
        for (name, value) in key_schema.attribute_names().zip(key) {
            match self.coercer.coerce_value(name, value)? {
                Some(v) => wire.push(v),
                None => return Ok(None),
            }
        }

        self.collection
            .get(&wire)?
            .map(|record| self.coercer.record_to_entity(record).and_then(E::from_attributes))
            .transpose()
    }

    /// Delete every item of the collection, page by page.
    ///
    /// Returns the number of deleted items.
    #[instrument(skip(self), fields(table = self.collection.name()))]
    pub fn clear(&self) -> Result<usize> {
        let key_schema = self.collection.key_schema(None)?;
        let mut options = QueryOptions {
            select: Some(Select::SpecificAttributes),
            attributes_to_get: Some(key_schema.attribute_names().map(str::to_string).collect()),
            ..QueryOptions::default()
        };

        let mut deleted = 0;
        loop {
            let page = self.collection.scan(&options)?;
            for key in page.items.unwrap_or_default() {
                self.collection.delete(&key)?;
                deleted += 1;
            }
            match page.last_evaluated_key {
                Some(start) => options.exclusive_start_key = Some(start),
                None => break,
            }
            debug!(deleted, "Continuing clear");
        }

        info!(deleted, "Cleared collection");
        Ok(deleted)
    }
}

impl<E> std::fmt::Debug for Command<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("table", &self.collection.name())
            .finish()
    }
}
