//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use lumadb_mapper::core::{IndexDescription, KeySchemaElement, TableDescription};
use lumadb_mapper::{Adapter, AttributeType, Attributes, Entity, Mapper, MemoryStore, Result, Schema, Value};

/// Purchase entity mirroring the `test_purchases` table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Purchase {
    pub id: Option<String>,
    pub region: String,
    pub subtotal: Option<f64>,
    pub created_at: f64,
}

impl Purchase {
    pub fn new(region: &str, subtotal: f64, created_at: f64) -> Self {
        Self {
            id: None,
            region: region.to_string(),
            subtotal: Some(subtotal),
            created_at,
        }
    }
}

impl Entity for Purchase {
    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("id", self.id.clone())
            .with("region", self.region.as_str())
            .with("subtotal", self.subtotal)
            .with("created_at", self.created_at)
    }

    fn from_attributes(mut attributes: Attributes) -> Result<Self> {
        Ok(Self {
            id: attributes.take("id")?,
            region: attributes.take("region")?,
            subtotal: attributes.take("subtotal")?,
            created_at: attributes.take("created_at")?,
        })
    }

    fn set_identity(&mut self, _attribute: &str, identity: Value) {
        self.id = identity.as_str().map(str::to_string);
    }
}

pub fn purchases_table() -> TableDescription {
    TableDescription::new(
        "test_purchases",
        vec![KeySchemaElement::hash("region"), KeySchemaElement::range("created_at")],
    )
    .with_local_index(IndexDescription::new(
        "by_subtotal",
        vec![KeySchemaElement::hash("region"), KeySchemaElement::range("subtotal")],
    ))
    .with_global_index(IndexDescription::new(
        "by_uuid",
        vec![KeySchemaElement::hash("uuid")],
    ))
}

pub fn users_table() -> TableDescription {
    TableDescription::new("test_users", vec![KeySchemaElement::hash("id")])
}

pub fn purchases_schema() -> Schema {
    Schema::builder()
        .mapped("id", AttributeType::String, "uuid")
        .attribute("region", AttributeType::String)
        .attribute("subtotal", AttributeType::Float)
        .attribute("created_at", AttributeType::Float)
        .identity("id")
        .build()
        .unwrap()
}

pub fn users_schema() -> Schema {
    Schema::builder()
        .attribute("id", AttributeType::String)
        .attribute("name", AttributeType::String)
        .attribute("age", AttributeType::Integer)
        .identity("id")
        .build()
        .unwrap()
}

/// Store with both test tables and an adapter over it
pub fn setup(page_size: usize) -> (Arc<MemoryStore>, Adapter) {
    let store = Arc::new(MemoryStore::new().with_page_size(page_size));
    store.create_table(purchases_table()).unwrap();
    store.create_table(users_table()).unwrap();

    let mapper = Mapper::new()
        .collection("test_purchases", purchases_schema())
        .collection("test_users", users_schema());
    let adapter = Adapter::new(Arc::clone(&store), mapper).unwrap();
    (store, adapter)
}

/// The four purchases of the walkthrough, created in order
pub fn seed_purchases(adapter: &Adapter) -> Vec<Purchase> {
    let mut purchases = vec![
        Purchase::new("europe", 15.0, 1.0),
        Purchase::new("europe", 10.0, 2.0),
        Purchase::new("usa", 5.0, 3.0),
        Purchase::new("asia", 100.0, 4.0),
    ];
    for purchase in &mut purchases {
        adapter.create("test_purchases", purchase).unwrap();
    }
    purchases
}
