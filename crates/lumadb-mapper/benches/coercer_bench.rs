//! Performance benchmarks for the coercion engine and query paging
//!
//! Run with: cargo bench -p lumadb-mapper

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use lumadb_mapper::core::{KeySchemaElement, TableDescription};
use lumadb_mapper::{
    Adapter, AttributeType, Attributes, Coercer, Document, Mapper, MemoryStore, Schema,
};

fn schema() -> Schema {
    Schema::builder()
        .mapped("id", AttributeType::String, "uuid")
        .attribute("region", AttributeType::String)
        .attribute("subtotal", AttributeType::Float)
        .attribute("item_ids", AttributeType::Set)
        .attribute("paid", AttributeType::Boolean)
        .attribute("created_at", AttributeType::Time)
        .identity("id")
        .build()
        .unwrap()
}

fn attributes() -> Attributes {
    Attributes::new()
        .with("id", "4b7c2b1e-3f7a-4c1d-9a55-0c4f8e2d7a10")
        .with("region", "europe")
        .with("subtotal", 15.0)
        .with(
            "item_ids",
            (0..8).map(|i| format!("item-{i}")).collect::<BTreeSet<_>>(),
        )
        .with("paid", true)
        .with("created_at", Utc::now())
}

fn bench_coercion(c: &mut Criterion) {
    let coercer = Coercer::new(Arc::new(schema())).unwrap();
    let attributes = attributes();
    let record = coercer.entity_to_record(&attributes).unwrap();

    let mut group = c.benchmark_group("coercion");
    group.throughput(Throughput::Elements(1));

    group.bench_function("entity_to_record", |b| {
        b.iter(|| coercer.entity_to_record(black_box(&attributes)).unwrap());
    });

    group.bench_function("record_to_entity", |b| {
        b.iter(|| coercer.record_to_entity(black_box(record.clone())).unwrap());
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let store = Arc::new(MemoryStore::new());
    store
        .create_table(TableDescription::new(
            "purchases",
            vec![KeySchemaElement::hash("region"), KeySchemaElement::range("created_at")],
        ))
        .unwrap();
    let adapter = Adapter::new(store, Mapper::new().collection("purchases", schema())).unwrap();

    // Prepopulate
    for i in 0..1000 {
        let region = if i % 2 == 0 { "europe" } else { "usa" };
        let mut purchase = Document::from(attributes())
            .with("id", Option::<String>::None)
            .with("region", region)
            .with("subtotal", f64::from(i))
            .with("created_at", Utc::now() + chrono::Duration::microseconds(i64::from(i)));
        adapter.create("purchases", &mut purchase).unwrap();
    }

    let mut group = c.benchmark_group("query");

    group.bench_function("query_with_filter", |b| {
        b.iter(|| {
            adapter
                .query::<Document>("purchases")
                .unwrap()
                .filter(black_box("region"), "europe")
                .unwrap()
                .gt("subtotal", 500.0)
                .unwrap()
                .all()
                .unwrap()
        });
    });

    group.bench_function("scan_count", |b| {
        b.iter(|| adapter.query::<Document>("purchases").unwrap().count().unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_coercion, bench_query);
criterion_main!(benches);
