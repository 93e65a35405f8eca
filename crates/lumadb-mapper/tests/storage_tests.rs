//! Store and wire translation tests

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use lumadb_mapper::core::{QueryOptions, StoreClient};
use lumadb_mapper::translator::{
    item_to_record, options_to_request, parse_response_page, parse_table_description,
    record_to_item,
};
use lumadb_mapper::{
    Adapter, AttributeType, Condition, ComparisonOperator, Config, Document, Mapper, MapperError,
    MemoryStore, Schema, StoreError, Value,
};

fn describe_table_document() -> serde_json::Value {
    json!({
        "Table": {
            "TableName": "test_devices",
            "KeySchema": [
                {"AttributeName": "uuid", "KeyType": "HASH"},
                {"AttributeName": "created_at", "KeyType": "RANGE"}
            ],
            "GlobalSecondaryIndexes": [{
                "IndexName": "by_owner",
                "KeySchema": [{"AttributeName": "owner", "KeyType": "HASH"}],
                "Projection": {"ProjectionType": "KEYS_ONLY"}
            }]
        }
    })
}

fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_table(parse_table_description(&describe_table_document()).unwrap())
        .unwrap();
    store
}

// ===== Wire Items =====

mod wire_items {
    use super::*;

    #[test]
    fn test_json_item_round_trips_through_store() {
        let store = store();
        let item = json!({
            "uuid": {"S": "d-1"},
            "created_at": {"N": "1388620800.5"},
            "owner": {"S": "ops"},
            "ports": {"NS": ["22", "80"]},
            "firmware": {"B": "AAEC"}
        });

        let record = item_to_record(item.as_object().unwrap()).unwrap();
        store.put_item("test_devices", record.clone()).unwrap();

        let key = json!({"uuid": {"S": "d-1"}, "created_at": {"N": "1388620800.5"}});
        let stored = store
            .get_item("test_devices", item_to_record(key.as_object().unwrap()).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored, record);
        assert_eq!(record_to_item(&stored)["firmware"], json!({"B": "AAEC"}));
    }

    #[test]
    fn test_keys_only_index_projects_keys() {
        let store = store();
        let item = json!({
            "uuid": {"S": "d-1"},
            "created_at": {"N": "1"},
            "owner": {"S": "ops"},
            "name": {"S": "router"}
        });
        store
            .put_item("test_devices", item_to_record(item.as_object().unwrap()).unwrap())
            .unwrap();

        let mut options = QueryOptions {
            index_name: Some("by_owner".into()),
            ..QueryOptions::default()
        };
        options.key_conditions.insert(
            "owner".into(),
            Condition::new(ComparisonOperator::Eq, Some(vec!["ops".into()])),
        );

        let body = options_to_request("test_devices", &options);
        assert_eq!(body["IndexName"], json!("by_owner"));
        assert_eq!(
            body["KeyConditions"]["owner"]["ComparisonOperator"],
            json!("EQ")
        );

        let page = store.query("test_devices", &options).unwrap();
        let items = page.items.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].contains_key("owner"));
        assert!(items[0].contains_key("uuid"));
        assert!(!items[0].contains_key("name"));
    }

    #[test]
    fn test_response_page_parsing() {
        let page = parse_response_page(&json!({
            "Count": 1,
            "ScannedCount": 3,
            "Items": [{"uuid": {"S": "d-1"}}],
            "LastEvaluatedKey": {"uuid": {"S": "d-1"}}
        }))
        .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.scanned_count, 3);
        assert!(page.last_evaluated_key.is_some());
    }
}

// ===== Errors =====

mod errors {
    use super::*;

    #[test]
    fn test_missing_table_is_resource_not_found() {
        let store = store();
        let err = store.describe_table("test_missing").unwrap_err();
        assert_eq!(err.dynamodb_code(), "ResourceNotFoundException");
    }

    #[test]
    fn test_store_errors_pass_through_unchanged() {
        let store = Arc::new(store());
        let schema = Schema::builder()
            .attribute("id", AttributeType::String)
            .identity("id")
            .build()
            .unwrap();
        let adapter = Adapter::new(
            Arc::clone(&store),
            Mapper::new().collection_as("devices", "test_devices", schema),
        )
        .unwrap();

        let injected = StoreError::Transport("connection reset".into());
        store.inject_failure(0, injected.clone());
        let err = adapter.query::<Document>("devices").unwrap().all().unwrap_err();
        assert!(matches!(err, MapperError::Store(ref e) if *e == injected));
    }

    #[test]
    fn test_configured_timeout_wraps_client() {
        let store = Arc::new(store().with_latency(Duration::from_millis(20)));
        let schema = Schema::builder()
            .mapped("id", AttributeType::String, "uuid")
            .attribute("created_at", AttributeType::Integer)
            .identity("id")
            .build()
            .unwrap();
        let config = Config {
            request_timeout_ms: Some(1),
            ..Config::default()
        };
        let mapper = Mapper::new().collection("test_devices", schema);
        let adapter = Adapter::from_config(Arc::clone(&store), mapper, &config).unwrap();

        let mut device = Document::new().with("created_at", 1);
        let err = adapter.create("test_devices", &mut device).unwrap_err();
        assert!(matches!(err, MapperError::Store(StoreError::Timeout(_))));
        assert_eq!(err.dynamodb_code(), "RequestTimeout");
        assert_eq!(device.get("id"), None::<&Value>);

        // the overrunning put still completed
        assert_eq!(store.item_count("test_devices").unwrap(), 1);
    }
}
