//! LumaDB Mapper Purchases Walkthrough
//!
//! Purchases are split by region and sorted by creation time. A local index
//! sorts them by subtotal and a global index finds them by uuid without
//! knowing the region.

use std::collections::BTreeSet;
use std::env;

use chrono::{DateTime, Duration, Utc};
use lumadb_mapper::config::{self, Config};
use lumadb_mapper::core::{IndexDescription, KeySchemaElement, TableDescription};
use lumadb_mapper::{
    Adapter, AttributeType, Attributes, Entity, Mapper, MemoryStore, Number, Result, Schema, Value,
};

#[derive(Debug, Clone, Default)]
struct Purchase {
    id: Option<String>,
    region: String,
    subtotal: f64,
    item_ids: Value,
    content: Option<Vec<u8>>,
    created_at: Option<DateTime<Utc>>,
}

impl Entity for Purchase {
    fn to_attributes(&self) -> Attributes {
        Attributes::new()
            .with("id", self.id.clone())
            .with("region", self.region.as_str())
            .with("subtotal", self.subtotal)
            .with("item_ids", self.item_ids.clone())
            .with("content", self.content.clone())
            .with("created_at", self.created_at)
    }

    fn from_attributes(mut attributes: Attributes) -> Result<Self> {
        Ok(Self {
            id: attributes.take("id")?,
            region: attributes.take("region")?,
            subtotal: attributes.take("subtotal")?,
            item_ids: attributes.take("item_ids")?,
            content: attributes.take("content")?,
            created_at: attributes.take("created_at")?,
        })
    }

    fn set_identity(&mut self, _attribute: &str, identity: Value) {
        self.id = identity.as_str().map(str::to_string);
    }
}

fn purchases_table(name: &str) -> TableDescription {
    TableDescription::new(
        name,
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

fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration from a file when given, else defaults
    let config = match env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config::init_tracing(&config.logging);

    let table = format!("{}purchases", config.table_prefix.as_deref().unwrap_or_default());
    let store = MemoryStore::new();
    store.create_table(purchases_table(&table))?;

    let schema = Schema::builder()
        .mapped("id", AttributeType::String, "uuid")
        .attribute("region", AttributeType::String)
        .attribute("subtotal", AttributeType::Float)
        .attribute("item_ids", AttributeType::Set)
        .attribute("content", AttributeType::Binary)
        .attribute("created_at", AttributeType::Time)
        .identity("id")
        .build()?;

    let adapter = Adapter::from_config(store, Mapper::new().collection("purchases", schema), &config)?;

    // Create some data
    let now = Utc::now();
    let numbers: BTreeSet<Number> = [1_i64, 2].into_iter().map(Number::from).collect();
    let strings: BTreeSet<String> = ["strings", "as", "well"].into_iter().map(String::from).collect();
    let mut purchases = vec![
        Purchase {
            region: "europe".into(),
            subtotal: 15.0,
            item_ids: numbers.into(),
            ..Purchase::default()
        },
        Purchase {
            region: "europe".into(),
            subtotal: 10.0,
            content: Some(b"Huge Blob Here".to_vec()),
            ..Purchase::default()
        },
        Purchase {
            region: "usa".into(),
            subtotal: 5.0,
            item_ids: strings.into(),
            ..Purchase::default()
        },
        Purchase {
            region: "asia".into(),
            subtotal: 100.0,
            ..Purchase::default()
        },
    ];
    for (offset, purchase) in (0_i64..).zip(purchases.iter_mut()) {
        purchase.created_at = Some(now + Duration::milliseconds(offset));
        adapter.create("purchases", purchase)?;
    }

    // Perform queries
    println!("Find by UUID");
    let uuid = purchases[0].id.clone().unwrap_or_default();
    let found = adapter
        .query::<Purchase>("purchases")?
        .index("by_uuid")?
        .filter("id", uuid)?
        .limit(1)
        .all()?;
    println!("{:?}\n", found.first());

    println!("Top by subtotal");
    for purchase in adapter.query_with::<Purchase>("purchases", |q| {
        Ok(q.index("by_subtotal")?.filter("region", "europe")?.desc().limit(50))
    })?.iter() {
        println!("{:?}", purchase?);
    }
    println!();

    println!("Europe between 8 and 14");
    let middle = adapter
        .query::<Purchase>("purchases")?
        .filter("region", "europe")?
        .filter("subtotal", 8.0..=14.0)?
        .all()?;
    println!("{middle:?}\n");

    println!("Subtotal of 100 (scan)");
    let large = adapter.query::<Purchase>("purchases")?.filter("subtotal", 100.0)?;
    println!("{:?} {:?}\n", large.operation(), large.all()?);

    println!("Total: {}", adapter.query::<Purchase>("purchases")?.count()?);
    Ok(())
}
