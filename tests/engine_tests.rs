//! Engine Tests
//!
//! Payload interpretation for create/read/update/delete/search/list.

use chunkdb::{Config, Engine};
use serde_json::{json, Value};
use tempfile::tempdir;

fn open_engine(dir: &std::path::Path) -> Engine {
    let config = Config::builder().data_dir(dir).chunk_capacity(5).build();
    Engine::open(config).unwrap()
}

/// Ids of every document in a collection, via list
fn doc_ids(engine: &Engine, db: &str, coll: &str) -> Vec<String> {
    let listed = engine.list(&json!({db: {coll: {}}})).unwrap();
    listed["documents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_create_nested_counts() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let counts = engine
        .create(&json!({
            "shop": {
                "orders": {"o1": {"amount": 5}, "o2": {"amount": 9}},
                "users": {}
            },
            "logs": {}
        }))
        .unwrap();

    assert_eq!(counts.databases, 2);
    assert_eq!(counts.collections, 2);
    assert_eq!(counts.documents, 2);
}

#[test]
fn test_create_is_additive_for_existing_resources() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    engine.create(&json!({"shop": {"orders": {}}})).unwrap();
    let counts = engine
        .create(&json!({"shop": {"orders": {"o1": {"amount": 5}}}}))
        .unwrap();

    assert_eq!(counts.databases, 0);
    assert_eq!(counts.collections, 0);
    assert_eq!(counts.documents, 1);
}

#[test]
fn test_create_validates_before_applying() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    // The second database's spec is malformed: nothing may be created
    let result = engine.create(&json!({"a": {"c": {}}, "b": "oops"}));
    assert!(result.is_err());
    assert!(engine.store().list_databases().is_empty());
}

#[test]
fn test_create_rejects_non_object_payloads() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    assert!(engine.create(&json!([])).is_err());
    assert!(engine.create(&json!({})).is_err());
    assert!(engine.create(&json!({"db": {"c": {"d": 42}}})).is_err());
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_paths() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"shop": {"orders": {"o1": {"amount": 5}}}}))
        .unwrap();

    let dbs = engine.read(&json!({})).unwrap();
    assert_eq!(dbs["databases"], json!(["shop"]));

    let colls = engine.read(&json!({"shop": {}})).unwrap();
    assert_eq!(colls["collections"], json!(["orders"]));

    let all = engine.read(&json!({"shop": {"orders": {}}})).unwrap();
    assert_eq!(all["count"], json!(1));
    assert_eq!(all["documents"][0]["amount"], json!(5));
}

#[test]
fn test_read_single_document_round_trip() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());

    let original = json!({"name": "Ada", "nested": {"k": [1, 2]}});
    engine
        .create(&json!({"db": {"c": {"d1": original.clone()}}}))
        .unwrap();
    let id = doc_ids(&engine, "db", "c").remove(0);

    // Both addressing forms reach the same document
    let by_map = engine.read(&json!({"db": {"c": {id.clone(): {}}}})).unwrap();
    let by_string = engine.read(&json!({"db": {"c": id.clone()}})).unwrap();
    assert_eq!(by_map, by_string);

    let mut doc = by_map;
    doc.as_object_mut().unwrap().remove("_id");
    assert_eq!(doc, original);
}

#[test]
fn test_read_missing_resources() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.create(&json!({"db": {"c": {}}})).unwrap();

    assert!(engine.read(&json!({"ghost": {}})).is_err());
    assert!(engine.read(&json!({"db": {"ghost": {}}})).is_err());
    assert!(engine.read(&json!({"db": {"c": {"nosuchid": {}}}})).is_err());
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_merges_document_fields() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {"c": {"d": {"a": 1, "b": 2}}}}))
        .unwrap();
    let id = doc_ids(&engine, "db", "c").remove(0);

    let counts = engine
        .update(&json!({"db": {"c": {id.clone(): {"b": 20, "c": 3}}}}))
        .unwrap();
    assert_eq!(counts.documents, 1);

    let doc = engine.read(&json!({"db": {"c": id}})).unwrap();
    assert_eq!(doc["a"], json!(1));
    assert_eq!(doc["b"], json!(20));
    assert_eq!(doc["c"], json!(3));
}

#[test]
fn test_update_renames_database_and_collection() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"shop": {"orders": {"o": {"amount": 5}}}}))
        .unwrap();

    let counts = engine.update(&json!({"shop": {"orders#": "sales"}})).unwrap();
    assert_eq!(counts.collections, 1);
    assert_eq!(engine.store().list_collections("shop"), vec!["sales"]);

    let counts = engine.update(&json!({"shop#": "store"})).unwrap();
    assert_eq!(counts.databases, 1);
    assert_eq!(engine.store().list_databases(), vec!["store"]);

    // Data survives both renames
    let all = engine.read(&json!({"store": {"sales": {}}})).unwrap();
    assert_eq!(all["count"], json!(1));
}

#[test]
fn test_update_rename_requires_string_target() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.create(&json!({"shop": {}})).unwrap();

    assert!(engine.update(&json!({"shop#": 5})).is_err());
    assert!(engine.update(&json!({"ghost#": "new"})).is_err());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_whole_resources_idempotent() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"shop": {"orders": {"o": {"amount": 5}}}}))
        .unwrap();

    let counts = engine.delete(&json!({"shop": {"orders": {}}})).unwrap();
    assert_eq!(counts.collections, 1);
    // Again: nothing left to delete, still success
    let counts = engine.delete(&json!({"shop": {"orders": {}}})).unwrap();
    assert!(counts.is_zero());

    let counts = engine.delete(&json!({"shop": {}})).unwrap();
    assert_eq!(counts.databases, 1);
    let counts = engine.delete(&json!({"shop": {}})).unwrap();
    assert!(counts.is_zero());
}

#[test]
fn test_delete_documents_by_id_map() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {"c": {"a": {"n": 1}, "b": {"n": 2}, "c": {"n": 3}}}}))
        .unwrap();
    let ids = doc_ids(&engine, "db", "c");

    let counts = engine
        .delete(&json!({"db": {"c": {ids[0].clone(): {}, ids[1].clone(): {}, "ghost": {}}}}))
        .unwrap();
    // The absent id counts zero, the present two count
    assert_eq!(counts.documents, 2);
    assert_eq!(doc_ids(&engine, "db", "c").len(), 1);
}

#[test]
fn test_delete_documents_by_predicate() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {"c": {
            "a": {"amount": 50}, "b": {"amount": 150}, "c": {"amount": 250}
        }}}))
        .unwrap();

    let counts = engine
        .delete(&json!({"db": {"c": {"$field": "amount", ">": 100}}}))
        .unwrap();
    assert_eq!(counts.documents, 2);

    let left = engine.read(&json!({"db": {"c": {}}})).unwrap();
    assert_eq!(left["documents"][0]["amount"], json!(50));
}

#[test]
fn test_delete_collections_by_name_filter() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {"colBeta": {}, "Beta": {}, "colAlpha": {}}}))
        .unwrap();

    // "~Beta" is contains: it removes colBeta but not Beta itself
    let counts = engine.delete(&json!({"db": {"~Beta": {}}})).unwrap();
    assert_eq!(counts.collections, 1);
    assert_eq!(engine.store().list_collections("db"), vec!["Beta", "colAlpha"]);

    let counts = engine.delete(&json!({"db": {"==": "Beta"}})).unwrap();
    assert_eq!(counts.collections, 1);
    assert_eq!(engine.store().list_collections("db"), vec!["colAlpha"]);
}

#[test]
fn test_delete_databases_by_name_filter() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"tmpA": {}, "tmpB": {}, "keep": {}}))
        .unwrap();

    let counts = engine.delete(&json!({"^tmp": {}})).unwrap();
    assert_eq!(counts.databases, 2);
    assert_eq!(engine.store().list_databases(), vec!["keep"]);
}

#[test]
fn test_delete_bulk_across_matching_collections() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {
            "colA1": {"x": {"state": "old"}, "y": {"state": "new"}},
            "colA2": {"z": {"state": "old"}},
            "other": {"w": {"state": "old"}}
        }}))
        .unwrap();

    let counts = engine
        .delete(&json!({"db": {
            "collectionKey": "^colA",
            "docsObj": {"state": "old"}
        }}))
        .unwrap();
    assert_eq!(counts.documents, 2);

    // Non-matching collection untouched
    let other = engine.read(&json!({"db": {"other": {}}})).unwrap();
    assert_eq!(other["count"], json!(1));
    let a1 = engine.read(&json!({"db": {"colA1": {}}})).unwrap();
    assert_eq!(a1["documents"][0]["state"], json!("new"));
}

#[test]
fn test_delete_bulk_wrapper_nested_under_label_key() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {
            "colA1": {"x": {"state": "old"}, "y": {"state": "new"}},
            "colA2": {"z": {"state": "old"}}
        }}))
        .unwrap();

    // The wrapper may sit one level deeper under an arbitrary label
    let counts = engine
        .delete(&json!({"db": {"anything": {
            "collectionKey": "^colA",
            "docsObj": {"state": "old"}
        }}}))
        .unwrap();
    assert_eq!(counts.documents, 2);

    let a1 = engine.read(&json!({"db": {"colA1": {}}})).unwrap();
    assert_eq!(a1["documents"][0]["state"], json!("new"));
}

#[test]
fn test_delete_bulk_empty_query_removes_matching_collections() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {
            "colA1": {"x": {"n": 1}},
            "colA2": {},
            "other": {"y": {"n": 2}}
        }}))
        .unwrap();

    // An empty docsObj drops the matching collections themselves
    let counts = engine
        .delete(&json!({"db": {"wrap": {"collectionKey": "^colA", "docsObj": {}}}}))
        .unwrap();
    assert_eq!(counts.collections, 2);
    assert_eq!(counts.documents, 0);
    assert_eq!(engine.store().list_collections("db"), vec!["other"]);

    // Absent docsObj behaves the same, here in the flat shape
    engine.create(&json!({"db": {"colB": {}}})).unwrap();
    let counts = engine
        .delete(&json!({"db": {"collectionKey": "^colB"}}))
        .unwrap();
    assert_eq!(counts.collections, 1);
    assert_eq!(engine.store().list_collections("db"), vec!["other"]);
}

#[test]
fn test_delete_bad_predicate_applies_nothing() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {"c": {"a": {"amount": 1}, "b": {"amount": 2}}}}))
        .unwrap();

    let result = engine.delete(&json!({"db": {"c": {"amount": {"$bogus": 1}}}}));
    assert!(result.is_err());
    assert_eq!(doc_ids(&engine, "db", "c").len(), 2);
}

// =============================================================================
// Search Tests
// =============================================================================

fn seed_orders(engine: &Engine) {
    engine
        .create(&json!({"shop": {"orders": {
            "o1": {"amount": 50, "customer": {"name": "Ada", "city": "London"}},
            "o2": {"amount": 150, "customer": {"name": "Grace", "city": "Rome"}},
            "o3": {"amount": 250, "customer": {"name": "Alan", "city": "London"}}
        }}}))
        .unwrap();
}

#[test]
fn test_search_range_predicate() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_orders(&engine);

    let groups = engine
        .search(&json!({"shop": {"orders": {"$field": "amount", ">": 100}}}))
        .unwrap();
    let group = &groups.as_array().unwrap()[0];
    assert_eq!(group["database"], json!("shop"));
    assert_eq!(group["collection"], json!("orders"));
    assert_eq!(group["count"], json!(2));
}

#[test]
fn test_search_nested_dot_path() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    seed_orders(&engine);

    let groups = engine
        .search(&json!({"shop": {"orders": {"customer.city": "London"}}}))
        .unwrap();
    assert_eq!(groups[0]["count"], json!(2));
}

#[test]
fn test_search_collection_pattern_groups_results() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"db": {
            "colA": {"x": {"n": 1}},
            "colB": {"y": {"n": 2}},
            "other": {"z": {"n": 3}}
        }}))
        .unwrap();

    let groups = engine.search(&json!({"db": {"^col": {}}})).unwrap();
    let names: Vec<&str> = groups
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["collection"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["colA", "colB"]);
}

#[test]
fn test_search_pagination_envelope() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    let docs: Value = (0..25)
        .map(|i| (format!("d{}", i), json!({"n": i})))
        .collect::<serde_json::Map<String, Value>>()
        .into();
    engine.create(&json!({"db": {"c": docs}})).unwrap();

    // Default limit is 10, count reports all matches
    let groups = engine
        .search(&json!({"data": {"db": {"c": {}}}}))
        .unwrap();
    assert_eq!(groups[0]["count"], json!(25));
    assert_eq!(groups[0]["documents"].as_array().unwrap().len(), 10);

    let page3 = engine
        .search(&json!({"data": {"db": {"c": {}}}, "pageNumber": 3, "limit": 10}))
        .unwrap();
    assert_eq!(page3[0]["documents"].as_array().unwrap().len(), 5);
}

#[test]
fn test_search_absent_targets_yield_no_groups() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.create(&json!({"db": {"c": {}}})).unwrap();

    let groups = engine.search(&json!({"ghost": {"c": {}}})).unwrap();
    assert_eq!(groups, json!([]));
    let groups = engine.search(&json!({"db": {"ghost": {}}})).unwrap();
    assert_eq!(groups, json!([]));
}

// =============================================================================
// Export Tests
// =============================================================================

#[test]
fn test_export_whole_store_as_nested_object() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({
            "shop": {"orders": {"o1": {"amount": 5}}, "users": {}},
            "logs": {}
        }))
        .unwrap();
    let id = doc_ids(&engine, "shop", "orders").remove(0);

    let dump = engine.export(&Value::Null).unwrap();
    assert_eq!(dump["logs"], json!({}));
    assert_eq!(dump["shop"]["users"], json!({}));
    assert_eq!(dump["shop"]["orders"][&id]["amount"], json!(5));

    // An empty object payload means the same as null
    assert_eq!(engine.export(&json!({})).unwrap(), dump);
}

#[test]
fn test_export_scoped_to_database_or_collection() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({
            "shop": {"orders": {"o1": {"amount": 5}}},
            "logs": {"events": {"e1": {"level": "warn"}}}
        }))
        .unwrap();

    let db_dump = engine.export(&json!({"shop": {}})).unwrap();
    assert!(db_dump.get("logs").is_none());
    assert_eq!(db_dump["shop"]["orders"].as_object().unwrap().len(), 1);

    let coll_dump = engine.export(&json!({"logs": {"events": {}}})).unwrap();
    let events = coll_dump["logs"]["events"].as_object().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events.values().next().unwrap()["level"], json!("warn"));
}

#[test]
fn test_export_missing_targets() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine.create(&json!({"db": {"c": {}}})).unwrap();

    assert!(engine.export(&json!({"ghost": {}})).is_err());
    assert!(engine.export(&json!({"db": {"ghost": {}}})).is_err());
    // Present but empty scopes export empty objects
    assert_eq!(engine.export(&json!({"db": {"c": {}}})).unwrap(), json!({"db": {"c": {}}}));
}

// =============================================================================
// List Tests
// =============================================================================

#[test]
fn test_list_paths() {
    let dir = tempdir().unwrap();
    let engine = open_engine(dir.path());
    engine
        .create(&json!({"shop": {"orders": {"o1": {"n": 1}, "o2": {"n": 2}}}}))
        .unwrap();

    let dbs = engine.list(&Value::Null).unwrap();
    assert_eq!(dbs["databases"], json!(["shop"]));

    let colls = engine.list(&json!({"shop": {}})).unwrap();
    assert_eq!(colls["collections"], json!(["orders"]));

    let docs = engine.list(&json!({"shop": {"orders": {}}})).unwrap();
    assert_eq!(docs["count"], json!(2));
    assert_eq!(docs["documents"].as_array().unwrap().len(), 2);
}
