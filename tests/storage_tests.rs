//! Chunk Store Tests
//!
//! On-disk layout, location index, chunk scaling, and reopen behavior.

use chunkdb::storage::ChunkStore;
use serde_json::json;
use tempfile::tempdir;

fn open_store(dir: &std::path::Path, capacity: usize) -> ChunkStore {
    ChunkStore::open(dir, capacity).unwrap()
}

// =============================================================================
// Database/Collection Lifecycle Tests
// =============================================================================

#[test]
fn test_create_database_and_collection() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    assert!(store.create_database("shop").unwrap());
    assert!(!store.create_database("shop").unwrap()); // already exists
    assert!(store.create_collection("shop", "orders").unwrap());
    assert!(!store.create_collection("shop", "orders").unwrap());

    assert_eq!(store.list_databases(), vec!["shop"]);
    assert_eq!(store.list_collections("shop"), vec!["orders"]);

    // Directories and chunk 0 exist on disk
    assert!(dir.path().join("shop/orders/chunk_000000.chk").is_file());
}

#[test]
fn test_collection_requires_database() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    let result = store.create_collection("missing", "orders");
    assert!(result.is_err());
}

#[test]
fn test_delete_database_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("shop").unwrap();
    assert!(store.delete_database("shop").unwrap());
    assert!(!store.delete_database("shop").unwrap());
    assert!(!dir.path().join("shop").exists());
}

#[test]
fn test_delete_collection_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("shop").unwrap();
    store.create_collection("shop", "orders").unwrap();
    assert!(store.delete_collection("shop", "orders").unwrap());
    assert!(!store.delete_collection("shop", "orders").unwrap());
    assert!(!store.delete_collection("ghost", "orders").unwrap());
}

#[test]
fn test_invalid_names_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    assert!(store.create_database("").is_err());
    assert!(store.create_database("a/b").is_err());
    assert!(store.create_database("..").is_err());

    store.create_database("ok").unwrap();
    assert!(store.create_collection("ok", "a\\b").is_err());
}

#[test]
fn test_rename_database_and_collection() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("shop").unwrap();
    store.create_collection("shop", "orders").unwrap();
    let id = store
        .insert("shop", "orders", json!({"amount": 5}))
        .unwrap();

    store.rename_collection("shop", "orders", "sales").unwrap();
    assert_eq!(store.list_collections("shop"), vec!["sales"]);
    assert_eq!(store.get("shop", "sales", &id).unwrap()["amount"], json!(5));

    store.rename_database("shop", "store").unwrap();
    assert_eq!(store.list_databases(), vec!["store"]);
    assert_eq!(store.get("store", "sales", &id).unwrap()["amount"], json!(5));
}

#[test]
fn test_rename_conflicts() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("a").unwrap();
    store.create_database("b").unwrap();
    assert!(store.rename_database("a", "b").is_err());
    assert!(store.rename_database("ghost", "c").is_err());

    store.create_collection("a", "x").unwrap();
    store.create_collection("a", "y").unwrap();
    assert!(store.rename_collection("a", "x", "y").is_err());
}

// =============================================================================
// Document Tests
// =============================================================================

#[test]
fn test_insert_assigns_id_and_preserves_fields() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();

    let original = json!({"name": "Ada", "tags": ["x", "y"], "nested": {"n": 1}});
    let id = store.insert("db", "c", original.clone()).unwrap();
    assert_eq!(id.len(), 24);

    let mut stored = store.get("db", "c", &id).unwrap();
    let obj = stored.as_object_mut().unwrap();
    assert_eq!(obj.remove("_id").unwrap(), json!(id));
    // Everything except _id round-trips exactly
    assert_eq!(json!(obj), original);
}

#[test]
fn test_update_merges_fields() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    let id = store
        .insert("db", "c", json!({"a": 1, "b": 2}))
        .unwrap();

    let updated = store
        .update("db", "c", &id, &json!({"b": 20, "c": 3}))
        .unwrap();
    assert_eq!(updated["a"], json!(1));
    assert_eq!(updated["b"], json!(20));
    assert_eq!(updated["c"], json!(3));
    assert_eq!(updated["_id"], json!(id));
}

#[test]
fn test_update_rejects_id_change() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    let id = store.insert("db", "c", json!({"a": 1})).unwrap();

    let result = store.update("db", "c", &id, &json!({"_id": "other"}));
    assert!(result.is_err());
    // Matching _id in the patch is allowed and ignored
    store.update("db", "c", &id, &json!({"_id": id, "a": 2})).unwrap();
}

#[test]
fn test_delete_document() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    let id = store.insert("db", "c", json!({"a": 1})).unwrap();

    assert!(store.contains("db", "c", &id));
    store.delete("db", "c", &id).unwrap();
    assert!(!store.contains("db", "c", &id));
    assert!(store.get("db", "c", &id).is_err());
    assert!(store.delete("db", "c", &id).is_err());
}

#[test]
fn test_failed_insert_leaves_no_trace_in_memory() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 10);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    store.insert("db", "c", json!({"a": 1})).unwrap();

    // Pull the chunk directory out from under the store so the next save
    // cannot land on disk
    std::fs::remove_dir_all(dir.path().join("db").join("c")).unwrap();

    assert!(store.insert("db", "c", json!({"a": 2})).is_err());
    // The unacknowledged document is not visible to scans or counts
    assert_eq!(store.document_count("db", "c").unwrap(), 1);
    let docs: Vec<_> = store.list_all("db", "c").unwrap().collect();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].1["a"], json!(1));
}

// =============================================================================
// Chunk Scaling Tests
// =============================================================================

#[test]
fn test_chunks_allocated_as_capacity_fills() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 3);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();

    for i in 0..10 {
        store.insert("db", "c", json!({"n": i})).unwrap();
    }

    assert_eq!(store.document_count("db", "c").unwrap(), 10);
    // 3 + 3 + 3 + 1 documents across four chunks
    assert_eq!(store.chunk_count("db", "c").unwrap(), 4);
    assert!(dir.path().join("db/c/chunk_000003.chk").is_file());
}

#[test]
fn test_scan_order_stable_across_repeats() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 3);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    for i in 0..8 {
        store.insert("db", "c", json!({"n": i})).unwrap();
    }

    let first: Vec<String> = store.list_all("db", "c").unwrap().map(|(id, _)| id).collect();
    let second: Vec<String> = store.list_all("db", "c").unwrap().map(|(id, _)| id).collect();
    assert_eq!(first.len(), 8);
    assert_eq!(first, second);
}

#[test]
fn test_trailing_empty_chunks_reclaimed() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 2);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    let ids: Vec<String> = (0..6)
        .map(|i| store.insert("db", "c", json!({"n": i})).unwrap())
        .collect();
    assert_eq!(store.chunk_count("db", "c").unwrap(), 3);

    // Empty the last two chunks; they are removed, chunk 0 survives
    for id in &ids[2..] {
        store.delete("db", "c", id).unwrap();
    }
    assert_eq!(store.chunk_count("db", "c").unwrap(), 1);
    assert!(!dir.path().join("db/c/chunk_000002.chk").exists());
    assert!(dir.path().join("db/c/chunk_000000.chk").is_file());
}

#[test]
fn test_freed_slot_reused_in_last_chunk() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path(), 4);

    store.create_database("db").unwrap();
    store.create_collection("db", "c").unwrap();
    let ids: Vec<String> = (0..3)
        .map(|i| store.insert("db", "c", json!({"n": i})).unwrap())
        .collect();

    store.delete("db", "c", &ids[1]).unwrap();
    store.insert("db", "c", json!({"n": 99})).unwrap();

    // Reuse keeps everything in chunk 0
    assert_eq!(store.chunk_count("db", "c").unwrap(), 1);
    assert_eq!(store.document_count("db", "c").unwrap(), 3);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_rebuilds_index() {
    let dir = tempdir().unwrap();
    let ids: Vec<String>;
    {
        let store = open_store(dir.path(), 3);
        store.create_database("db").unwrap();
        store.create_collection("db", "c").unwrap();
        ids = (0..7)
            .map(|i| store.insert("db", "c", json!({"n": i})).unwrap())
            .collect();
    }

    let store = open_store(dir.path(), 3);
    assert_eq!(store.list_databases(), vec!["db"]);
    assert_eq!(store.document_count("db", "c").unwrap(), 7);
    assert_eq!(store.chunk_count("db", "c").unwrap(), 3);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(store.get("db", "c", id).unwrap()["n"], json!(i));
    }
}

#[test]
fn test_reopen_detects_corruption() {
    let dir = tempdir().unwrap();
    {
        let store = open_store(dir.path(), 3);
        store.create_database("db").unwrap();
        store.create_collection("db", "c").unwrap();
        store.insert("db", "c", json!({"n": 1})).unwrap();
    }

    // Flip a byte in the chunk body
    let path = dir.path().join("db/c/chunk_000000.chk");
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let result = ChunkStore::open(dir.path(), 3);
    assert!(result.is_err());
}

#[test]
fn test_zero_chunk_capacity_rejected() {
    let dir = tempdir().unwrap();
    assert!(ChunkStore::open(dir.path(), 0).is_err());
}
