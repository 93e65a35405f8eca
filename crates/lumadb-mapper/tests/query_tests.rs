//! Query builder routing, filtering and pagination tests

mod common;

use common::{seed_purchases, setup, Purchase};
use lumadb_mapper::core::{ComparisonOperator, StoreError};
use lumadb_mapper::query::Operation;
use lumadb_mapper::{Adapter, Document, MapperError, Value};

fn seed_users(adapter: &Adapter, names: &[&str]) {
    for (age, name) in (20_i64..).zip(names) {
        let mut user = Document::new().with("name", *name).with("age", age);
        adapter.create("test_users", &mut user).unwrap();
    }
}

fn names(users: &[Document]) -> Vec<String> {
    let mut names: Vec<String> = users
        .iter()
        .filter_map(|u| u.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    names.sort();
    names
}

// ===== Routing =====

mod routing {
    use super::*;

    #[test]
    fn test_non_key_conditions_stay_scan() {
        let (_, adapter) = setup(100);
        let query = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("subtotal", 100.0)
            .unwrap()
            .filter("id", "abc")
            .unwrap();

        assert_eq!(query.operation(), Operation::Scan);
        let options = query.options();
        assert!(options.key_conditions.is_empty());
        assert!(options.scan_filter.contains_key("subtotal"));
        assert!(options.scan_filter.contains_key("uuid"));
    }

    #[test]
    fn test_key_condition_upgrades_and_moves_filters() {
        let (_, adapter) = setup(100);
        let query = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .gt("subtotal", 8.0)
            .unwrap()
            .filter("region", "europe")
            .unwrap()
            .lt("subtotal", 20.0)
            .unwrap();

        assert_eq!(query.operation(), Operation::Query);
        let options = query.options();
        assert!(options.scan_filter.is_empty());
        assert_eq!(
            options.key_conditions["region"].comparison_operator,
            ComparisonOperator::Eq
        );
        assert_eq!(options.query_filter.len(), 1);
        assert_eq!(
            options.query_filter["subtotal"].comparison_operator,
            ComparisonOperator::Lt
        );
    }

    #[test]
    fn test_directives_upgrade() {
        let (_, adapter) = setup(100);
        let base = adapter.query::<Purchase>("test_purchases").unwrap();

        assert_eq!(base.clone().desc().operation(), Operation::Query);
        assert_eq!(base.clone().asc().operation(), Operation::Query);
        assert_eq!(base.clone().consistent().operation(), Operation::Query);
        assert_eq!(base.clone().limit(3).operation(), Operation::Scan);
        assert_eq!(base.operation(), Operation::Scan);
    }

    #[test]
    fn test_index_regroups_conditions() {
        let (_, adapter) = setup(100);
        let query = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("subtotal", 10.0)
            .unwrap()
            .filter("region", "europe")
            .unwrap()
            .index("by_subtotal")
            .unwrap();

        let options = query.options();
        assert_eq!(options.index_name.as_deref(), Some("by_subtotal"));
        assert!(options.key_conditions.contains_key("region"));
        assert!(options.key_conditions.contains_key("subtotal"));
        assert!(options.query_filter.is_empty());
    }

    #[test]
    fn test_unknown_index() {
        let (_, adapter) = setup(100);
        let err = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .index("by_color")
            .unwrap_err();
        assert!(matches!(err, MapperError::IndexNotFound { ref index, .. } if index == "by_color"));
    }

    #[test]
    fn test_later_condition_replaces_earlier() {
        let (_, adapter) = setup(100);
        let query = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("subtotal", 1.0)
            .unwrap()
            .ge("subtotal", 2.0)
            .unwrap();

        let condition = &query.options().scan_filter["subtotal"];
        assert_eq!(condition.comparison_operator, ComparisonOperator::Ge);
        assert_eq!(condition.attribute_value_list.as_ref().map(Vec::len), Some(1));
    }
}

// ===== Conditions =====

mod conditions {
    use super::*;

    #[test]
    fn test_operand_inference() {
        let (_, adapter) = setup(100);
        seed_users(&adapter, &["A", "B", "C", "D"]);
        let users = adapter.query::<Document>("test_users").unwrap();

        let found = users.clone().filter("name", vec!["A", "C"]).unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["A", "C"]);

        let found = users.clone().filter("age", 21..=22).unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["B", "C"]);

        let found = users.clone().exclude("name", "D").unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["A", "B", "C"]);

        let found = users.is_in("age", [20, 23]).unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["A", "D"]);
    }

    #[test]
    fn test_comparisons_and_strings() {
        let (_, adapter) = setup(100);
        seed_users(&adapter, &["Anna", "Bob", "Annie", "Carl"]);
        let users = adapter.query::<Document>("test_users").unwrap();

        let found = users.clone().begins_with("name", "Ann").unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["Anna", "Annie"]);

        let found = users.clone().contains("name", "o").unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["Bob"]);

        let found = users.clone().not_contains("name", "n").unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["Bob", "Carl"]);

        let found = users.clone().le("age", 21).unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["Anna", "Bob"]);

        let found = users.between("age", 21, 22).unwrap().all().unwrap();
        assert_eq!(names(&found), vec!["Annie", "Bob"]);
    }

    #[test]
    fn test_null_checks() {
        let (_, adapter) = setup(100);
        seed_users(&adapter, &["A", "B"]);
        let mut anonymous = Document::new().with("age", 40);
        adapter.create("test_users", &mut anonymous).unwrap();

        let users = adapter.query::<Document>("test_users").unwrap();
        assert_eq!(users.clone().null("name").unwrap().count().unwrap(), 1);
        assert_eq!(users.not_null("name").unwrap().count().unwrap(), 2);
    }

    #[test]
    fn test_or_combines_filters() {
        let (_, adapter) = setup(100);
        seed_users(&adapter, &["A", "B", "C"]);

        let found = adapter
            .query::<Document>("test_users")
            .unwrap()
            .filter("name", "A")
            .unwrap()
            .filter("age", 22)
            .unwrap()
            .or()
            .all()
            .unwrap();
        assert_eq!(names(&found), vec!["A", "C"]);
    }

    #[test]
    fn test_select_projects_attributes() {
        let (_, adapter) = setup(100);
        seed_users(&adapter, &["A"]);

        let found = adapter
            .query::<Document>("test_users")
            .unwrap()
            .select(["name"])
            .all()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("name"), Some(&Value::from("A")));
        assert_eq!(found[0].get("age"), Some(&Value::Null));
    }

    #[test]
    fn test_coercion_errors_surface_at_build_time() {
        let (_, adapter) = setup(100);
        let err = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("subtotal", "cheap")
            .unwrap_err();
        assert!(matches!(err, MapperError::Coercion { ref attribute, .. } if attribute == "subtotal"));

        let err = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("region", Value::Null)
            .unwrap_err();
        assert!(matches!(err, MapperError::Coercion { .. }));
    }

    #[test]
    fn test_unsupported_operations() {
        let (_, adapter) = setup(100);
        let query = adapter.query::<Purchase>("test_purchases").unwrap();

        assert!(matches!(
            query.clone().offset(10),
            Err(MapperError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            query.clone().exclude("subtotal", vec![1.0, 2.0]),
            Err(MapperError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            query.clone().exclude("subtotal", 1.0..=2.0),
            Err(MapperError::UnsupportedOperation(_))
        ));
        assert!(matches!(query.clone().negate(), Err(MapperError::UnsupportedOperation(_))));
        for result in [
            query.sum("subtotal"),
            query.average("subtotal"),
            query.avg("subtotal"),
            query.min("subtotal"),
            query.max("subtotal"),
            query.interval("subtotal"),
            query.range("subtotal"),
        ] {
            assert!(matches!(result, Err(MapperError::UnsupportedOperation(_))));
        }
    }
}

// ===== Ordering =====

mod ordering {
    use super::*;

    fn created_at(purchases: &[Purchase]) -> Vec<f64> {
        purchases.iter().map(|p| p.created_at).collect()
    }

    #[test]
    fn test_range_key_order() {
        let (_, adapter) = setup(100);
        seed_purchases(&adapter);
        let europe = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("region", "europe")
            .unwrap();

        assert_eq!(created_at(&europe.clone().asc().all().unwrap()), vec![1.0, 2.0]);
        assert_eq!(created_at(&europe.clone().desc().all().unwrap()), vec![2.0, 1.0]);
        assert_eq!(
            created_at(&europe.desc_by(["subtotal"]).all().unwrap()),
            vec![2.0, 1.0]
        );
    }

    #[test]
    fn test_limit_reads_one_page() {
        let (store, adapter) = setup(100);
        seed_purchases(&adapter);

        let found = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("region", "europe")
            .unwrap()
            .limit(1)
            .all()
            .unwrap();
        assert_eq!(created_at(&found), vec![1.0]);
        assert_eq!(store.stats().queries, 1);
    }

    #[test]
    fn test_consistent_read_on_global_index_is_rejected() {
        let (_, adapter) = setup(100);
        seed_purchases(&adapter);

        let err = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .index("by_uuid")
            .unwrap()
            .filter("id", "abc")
            .unwrap()
            .consistent()
            .all()
            .unwrap_err();
        assert!(matches!(err, MapperError::Store(StoreError::Validation(_))));
    }
}

// ===== Pagination =====

mod pagination {
    use super::*;

    const NAMES: [&str; 5] = ["A", "B", "C", "D", "E"];

    #[test]
    fn test_all_reads_every_page() {
        let (store, adapter) = setup(2);
        seed_users(&adapter, &NAMES);

        let query = adapter.query::<Document>("test_users").unwrap();
        assert_eq!(names(&query.all().unwrap()), NAMES);
        assert_eq!(store.stats().scans, 3);

        // The builder is not consumed by materialization
        assert_eq!(query.all().unwrap().len(), 5);
    }

    #[test]
    fn test_iter_fetches_lazily() {
        let (store, adapter) = setup(2);
        seed_users(&adapter, &NAMES);

        let query = adapter.query::<Document>("test_users").unwrap();
        let mut iter = query.iter();
        assert_eq!(store.stats().scans, 0);

        assert!(iter.next().is_some());
        assert_eq!(store.stats().scans, 1);
        assert_eq!(iter.count(), 4);
        assert_eq!(store.stats().scans, 3);
    }

    #[test]
    fn test_each_and_count_cover_all_pages() {
        let (_, adapter) = setup(2);
        seed_users(&adapter, &NAMES);
        let query = adapter.query::<Document>("test_users").unwrap();

        let mut seen = Vec::new();
        let total = query.each(|user| seen.push(user)).unwrap();
        assert_eq!(total, 5);
        assert_eq!(names(&seen), NAMES);

        assert_eq!(query.count().unwrap(), 5);
        assert!(query.exists().unwrap());

        let none = query.filter("name", "Z").unwrap();
        assert_eq!(none.count().unwrap(), 0);
        assert!(none.is_empty().unwrap());
    }

    #[test]
    fn test_filtered_query_pages() {
        let (_, adapter) = setup(1);
        seed_purchases(&adapter);

        let found = adapter
            .query::<Purchase>("test_purchases")
            .unwrap()
            .filter("region", "europe")
            .unwrap()
            .gt("subtotal", 12.0)
            .unwrap()
            .all()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subtotal, Some(15.0));
    }

    #[test]
    fn test_failure_mid_pagination() {
        let (store, adapter) = setup(2);
        seed_users(&adapter, &NAMES);
        let query = adapter.query::<Document>("test_users").unwrap();
        let throttled = StoreError::ThroughputExceeded("slow down".into());

        store.inject_failure(1, throttled.clone());
        let results: Vec<_> = query.iter().collect();
        assert_eq!(results.len(), 3);
        assert!(results[..2].iter().all(Result::is_ok));
        assert!(matches!(
            results[2],
            Err(MapperError::Store(StoreError::ThroughputExceeded(_)))
        ));

        store.inject_failure(1, throttled.clone());
        let mut seen = 0;
        let err = query.each(|_| seen += 1).unwrap_err();
        assert_eq!(seen, 2);
        assert_eq!(err.dynamodb_code(), "ProvisionedThroughputExceededException");

        store.inject_failure(1, throttled.clone());
        assert!(query.all().is_err());
        store.inject_failure(1, throttled);
        assert!(query.count().is_err());
    }
}
