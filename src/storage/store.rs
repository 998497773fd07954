//! Chunk Store
//!
//! Owns on-disk document storage, chunk allocation, and the per-collection
//! document-id -> location index.
//!
//! ## Responsibilities
//! - Discover databases/collections and rebuild indexes on startup
//! - Place inserts into the last chunk with free capacity
//! - O(1) point lookup via the location index
//! - Reclaim trailing chunks emptied by deletions
//!
//! ## Concurrency
//! - `databases`: RwLock map of database handles
//! - each `Database`: RwLock map of collection handles
//! - each `Collection`: RwLock over chunks + index
//!
//! Collection-level locking is deliberately independent of the coordinator's
//! resource-key granularity: two commands on different document keys may land
//! in the same collection, and must still serialize at the chunk level.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{DbError, Result};

use super::chunk::Chunk;
use super::{generate_id, DocLocation};

/// Chunk file name for a given chunk number: "chunk_000042.chk"
fn chunk_file_name(number: usize) -> String {
    format!("chunk_{:06}.chk", number)
}

/// Parse a chunk number from a file name
fn parse_chunk_number(path: &Path) -> Option<usize> {
    let name = path.file_stem()?.to_string_lossy();
    let id_str = name.strip_prefix("chunk_")?;
    id_str.parse().ok()
}

/// Per-collection mutable state: the chunks and the location index
struct CollectionState {
    chunks: Vec<Chunk>,
    index: HashMap<String, DocLocation>,
}

/// A single collection of documents, stored as numbered chunk files
struct Collection {
    dir: PathBuf,
    capacity: usize,
    state: RwLock<CollectionState>,
}

impl Collection {
    /// Create a fresh collection with an empty chunk 0 on disk
    fn create(dir: PathBuf, capacity: usize) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let chunk0 = Chunk::new();
        chunk0.save(&dir.join(chunk_file_name(0)))?;
        Ok(Self {
            dir,
            capacity,
            state: RwLock::new(CollectionState {
                chunks: vec![chunk0],
                index: HashMap::new(),
            }),
        })
    }

    /// Load an existing collection directory, rebuilding the location index
    /// from chunk contents.
    fn load(dir: PathBuf, capacity: usize) -> Result<Self> {
        let mut numbered: Vec<(usize, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(number) = parse_chunk_number(&path) {
                    numbered.push((number, path));
                }
            }
        }
        numbered.sort_by_key(|(number, _)| *number);

        let mut chunks = Vec::with_capacity(numbered.len());
        let mut index = HashMap::new();
        for (chunk_no, (_, path)) in numbered.iter().enumerate() {
            let chunk = Chunk::load(path)?;
            for (slot, occupied) in chunk.iter() {
                index.insert(
                    occupied.id.clone(),
                    DocLocation {
                        chunk: chunk_no,
                        slot,
                    },
                );
            }
            chunks.push(chunk);
        }

        // A collection always owns at least chunk 0
        if chunks.is_empty() {
            let chunk0 = Chunk::new();
            chunk0.save(&dir.join(chunk_file_name(0)))?;
            chunks.push(chunk0);
        }

        Ok(Self {
            dir,
            capacity,
            state: RwLock::new(CollectionState { chunks, index }),
        })
    }

    fn chunk_path(&self, number: usize) -> PathBuf {
        self.dir.join(chunk_file_name(number))
    }

    /// Insert a document into the last chunk with free capacity, creating a
    /// new chunk when the last one is full. Returns the assigned id.
    fn insert(&self, mut document: Value) -> Result<String> {
        let obj = document
            .as_object_mut()
            .ok_or_else(|| DbError::InvalidCommand("Document must be an object".to_string()))?;

        let mut state = self.state.write();

        // Unique within the collection; regenerate on the (unlikely) collision
        let mut id = generate_id();
        while state.index.contains_key(&id) {
            id = generate_id();
        }
        obj.insert("_id".to_string(), Value::String(id.clone()));

        let mut chunk_no = state.chunks.len() - 1;
        let slot = match state.chunks[chunk_no].insert(id.clone(), document.clone(), self.capacity)
        {
            Some(slot) => slot,
            None => {
                // Last chunk full: allocate the next numbered chunk
                state.chunks.push(Chunk::new());
                chunk_no += 1;
                state.chunks[chunk_no]
                    .insert(id.clone(), document, self.capacity)
                    .expect("empty chunk rejected insert")
            }
        };

        if let Err(e) = state.chunks[chunk_no].save(&self.chunk_path(chunk_no)) {
            // The document was never acknowledged: take it back out so
            // scans and reopened stores agree
            state.chunks[chunk_no].remove(slot);
            if chunk_no > 0 && state.chunks[chunk_no].is_empty() {
                state.chunks.pop();
            }
            return Err(e);
        }
        state.index.insert(
            id.clone(),
            DocLocation {
                chunk: chunk_no,
                slot,
            },
        );

        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Value> {
        let state = self.state.read();
        let loc = state
            .index
            .get(id)
            .ok_or_else(|| DbError::NotFound(format!("Document '{}' not found", id)))?;
        let slot = state.chunks[loc.chunk]
            .slot(loc.slot)
            .ok_or_else(|| DbError::Storage(format!("Stale index entry for '{}'", id)))?;
        Ok(slot.document.clone())
    }

    /// Shallow-merge `fields` into the document, in place in its chunk/slot.
    /// The id is immutable: a mismatched `_id` in the patch is rejected.
    fn update(&self, id: &str, fields: &Value) -> Result<Value> {
        let patch = fields
            .as_object()
            .ok_or_else(|| DbError::InvalidCommand("Update data must be an object".to_string()))?;

        if let Some(Value::String(patch_id)) = patch.get("_id") {
            if patch_id != id {
                return Err(DbError::InvalidCommand(
                    "Document id mismatch: cannot update document with different id".to_string(),
                ));
            }
        }

        let mut state = self.state.write();
        let loc = *state
            .index
            .get(id)
            .ok_or_else(|| DbError::NotFound(format!("Document '{}' not found", id)))?;

        let document = state.chunks[loc.chunk]
            .document_mut(loc.slot)
            .ok_or_else(|| DbError::Storage(format!("Stale index entry for '{}'", id)))?;
        let target = document
            .as_object_mut()
            .ok_or_else(|| DbError::Storage("Stored document is not an object".to_string()))?;

        for (key, value) in patch {
            if key == "_id" {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
        let updated = document.clone();

        state.chunks[loc.chunk].save(&self.chunk_path(loc.chunk))?;
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        let loc = state
            .index
            .remove(id)
            .ok_or_else(|| DbError::NotFound(format!("Document '{}' not found", id)))?;

        state.chunks[loc.chunk].remove(loc.slot);
        state.chunks[loc.chunk].save(&self.chunk_path(loc.chunk))?;

        // Reclaim trailing empty chunks, but never chunk 0
        while state.chunks.len() > 1 && state.chunks.last().is_some_and(|c| c.is_empty()) {
            let number = state.chunks.len() - 1;
            state.chunks.pop();
            let path = self.chunk_path(number);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.state.read().index.contains_key(id)
    }

    fn document_count(&self) -> usize {
        self.state.read().index.len()
    }

    fn chunk_count(&self) -> usize {
        self.state.read().chunks.len()
    }
}

/// A named database: a directory of collections
struct Database {
    dir: PathBuf,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    fn create(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            collections: RwLock::new(HashMap::new()),
        })
    }

    fn load(dir: PathBuf, capacity: usize) -> Result<Self> {
        let mut collections = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                collections.insert(name, Arc::new(Collection::load(path, capacity)?));
            }
        }
        Ok(Self {
            dir,
            collections: RwLock::new(collections),
        })
    }
}

/// The chunk store: every database, collection, chunk, and index
///
/// Owned by the engine and passed explicitly; startup scans the data
/// directory and shutdown is implicit (every mutation is persisted before it
/// is acknowledged).
pub struct ChunkStore {
    data_dir: PathBuf,
    chunk_capacity: usize,
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl ChunkStore {
    /// Open or create a store rooted at `data_dir`
    pub fn open(data_dir: &Path, chunk_capacity: usize) -> Result<Self> {
        if chunk_capacity == 0 {
            return Err(DbError::Config(
                "chunk_capacity must be at least 1".to_string(),
            ));
        }
        fs::create_dir_all(data_dir)?;

        let mut databases = HashMap::new();
        for entry in fs::read_dir(data_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                databases.insert(name, Arc::new(Database::load(path, chunk_capacity)?));
            }
        }

        tracing::debug!(
            databases = databases.len(),
            "Chunk store opened at {}",
            data_dir.display()
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            chunk_capacity,
            databases: RwLock::new(databases),
        })
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // =========================================================================
    // Databases
    // =========================================================================

    /// Create a database if absent. Returns true if newly created.
    pub fn create_database(&self, db: &str) -> Result<bool> {
        validate_name(db, "database")?;
        let mut databases = self.databases.write();
        if databases.contains_key(db) {
            return Ok(false);
        }
        let dir = self.data_dir.join(db);
        databases.insert(db.to_string(), Arc::new(Database::create(dir)?));
        tracing::debug!(database = db, "Database created");
        Ok(true)
    }

    /// Delete a database and all its collections. Returns false if absent.
    pub fn delete_database(&self, db: &str) -> Result<bool> {
        let mut databases = self.databases.write();
        if databases.remove(db).is_none() {
            return Ok(false);
        }
        let dir = self.data_dir.join(db);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        tracing::debug!(database = db, "Database deleted");
        Ok(true)
    }

    /// All database names, sorted
    pub fn list_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// True if the database exists
    pub fn database_exists(&self, db: &str) -> bool {
        self.databases.read().contains_key(db)
    }

    /// Rename a database. The in-memory handles are reloaded from the new
    /// path so every collection points at its moved directory.
    pub fn rename_database(&self, db: &str, new_name: &str) -> Result<()> {
        validate_name(new_name, "database")?;
        let mut databases = self.databases.write();
        if !databases.contains_key(db) {
            return Err(DbError::NotFound(format!("Database '{}' not found", db)));
        }
        if databases.contains_key(new_name) {
            return Err(DbError::Conflict(format!(
                "Database '{}' already exists",
                new_name
            )));
        }
        let old_dir = self.data_dir.join(db);
        let new_dir = self.data_dir.join(new_name);
        fs::rename(&old_dir, &new_dir)?;
        databases.remove(db);
        databases.insert(
            new_name.to_string(),
            Arc::new(Database::load(new_dir, self.chunk_capacity)?),
        );
        Ok(())
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Create a collection if absent, allocating an empty chunk 0.
    /// Returns true if newly created. `NotFound` if the database is absent.
    pub fn create_collection(&self, db: &str, coll: &str) -> Result<bool> {
        validate_name(coll, "collection")?;
        let database = self.database(db)?;
        let mut collections = database.collections.write();
        if collections.contains_key(coll) {
            return Ok(false);
        }
        let dir = database.dir.join(coll);
        collections.insert(
            coll.to_string(),
            Arc::new(Collection::create(dir, self.chunk_capacity)?),
        );
        tracing::debug!(database = db, collection = coll, "Collection created");
        Ok(true)
    }

    /// Delete a collection and all its chunks. Returns false if absent.
    pub fn delete_collection(&self, db: &str, coll: &str) -> Result<bool> {
        let database = match self.try_database(db) {
            Some(database) => database,
            None => return Ok(false),
        };
        let mut collections = database.collections.write();
        if collections.remove(coll).is_none() {
            return Ok(false);
        }
        let dir = database.dir.join(coll);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        tracing::debug!(database = db, collection = coll, "Collection deleted");
        Ok(true)
    }

    /// Collection names in a database, sorted; empty if the database is absent
    pub fn list_collections(&self, db: &str) -> Vec<String> {
        match self.try_database(db) {
            Some(database) => {
                let mut names: Vec<String> =
                    database.collections.read().keys().cloned().collect();
                names.sort();
                names
            }
            None => Vec::new(),
        }
    }

    /// True if the collection exists
    pub fn collection_exists(&self, db: &str, coll: &str) -> bool {
        self.try_collection(db, coll).is_some()
    }

    /// Rename a collection within a database
    pub fn rename_collection(&self, db: &str, coll: &str, new_name: &str) -> Result<()> {
        validate_name(new_name, "collection")?;
        let database = self.database(db)?;
        let mut collections = database.collections.write();
        if !collections.contains_key(coll) {
            return Err(DbError::NotFound(format!(
                "Collection '{}' not found in database '{}'",
                coll, db
            )));
        }
        if collections.contains_key(new_name) {
            return Err(DbError::Conflict(format!(
                "Collection '{}' already exists",
                new_name
            )));
        }
        let old_dir = database.dir.join(coll);
        let new_dir = database.dir.join(new_name);
        fs::rename(&old_dir, &new_dir)?;
        collections.remove(coll);
        collections.insert(
            new_name.to_string(),
            Arc::new(Collection::load(new_dir, self.chunk_capacity)?),
        );
        Ok(())
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Insert a document, assigning its `_id`. Returns the id.
    pub fn insert(&self, db: &str, coll: &str, document: Value) -> Result<String> {
        self.collection(db, coll)?.insert(document)
    }

    /// Point lookup by id
    pub fn get(&self, db: &str, coll: &str, id: &str) -> Result<Value> {
        self.collection(db, coll)?.get(id)
    }

    /// Merge fields into an existing document
    pub fn update(&self, db: &str, coll: &str, id: &str, fields: &Value) -> Result<Value> {
        self.collection(db, coll)?.update(id, fields)
    }

    /// Delete a document by id
    pub fn delete(&self, db: &str, coll: &str, id: &str) -> Result<()> {
        self.collection(db, coll)?.delete(id)
    }

    /// True if the collection holds a document with this id
    pub fn contains(&self, db: &str, coll: &str, id: &str) -> bool {
        self.try_collection(db, coll)
            .map(|c| c.contains(id))
            .unwrap_or(false)
    }

    /// Lazy, restartable scan over (id, document) pairs: chunks in ascending
    /// order, slots in insertion order within each chunk.
    pub fn list_all(&self, db: &str, coll: &str) -> Result<ListAll> {
        let collection = self.collection(db, coll)?;
        Ok(ListAll {
            collection,
            chunk: 0,
            slot: 0,
        })
    }

    /// Number of live documents in a collection
    pub fn document_count(&self, db: &str, coll: &str) -> Result<usize> {
        Ok(self.collection(db, coll)?.document_count())
    }

    /// Number of chunks backing a collection
    pub fn chunk_count(&self, db: &str, coll: &str) -> Result<usize> {
        Ok(self.collection(db, coll)?.chunk_count())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn try_database(&self, db: &str) -> Option<Arc<Database>> {
        self.databases.read().get(db).cloned()
    }

    fn database(&self, db: &str) -> Result<Arc<Database>> {
        self.try_database(db)
            .ok_or_else(|| DbError::NotFound(format!("Database '{}' not found", db)))
    }

    fn try_collection(&self, db: &str, coll: &str) -> Option<Arc<Collection>> {
        self.try_database(db)?.collections.read().get(coll).cloned()
    }

    fn collection(&self, db: &str, coll: &str) -> Result<Arc<Collection>> {
        let database = self.database(db)?;
        let collection = database.collections.read().get(coll).cloned();
        collection.ok_or_else(|| {
            DbError::NotFound(format!(
                "Collection '{}' not found in database '{}'",
                coll, db
            ))
        })
    }
}

/// Iterator over every (id, document) pair in a collection.
///
/// Takes the collection read lock per step, so it observes mutations made
/// between steps rather than holding readers out for a whole scan. Order is
/// stable across repeated calls as long as the collection is not mutated.
pub struct ListAll {
    collection: Arc<Collection>,
    chunk: usize,
    slot: usize,
}

impl Iterator for ListAll {
    type Item = (String, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.collection.state.read();
        while self.chunk < state.chunks.len() {
            let chunk = &state.chunks[self.chunk];
            while self.slot < chunk.slot_count() {
                let slot_idx = self.slot;
                self.slot += 1;
                if let Some(slot) = chunk.slot(slot_idx) {
                    return Some((slot.id.clone(), slot.document.clone()));
                }
            }
            self.chunk += 1;
            self.slot = 0;
        }
        None
    }
}

/// Names become directories on disk; reject separators and reserved names.
fn validate_name(name: &str, kind: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DbError::InvalidCommand(format!(
            "{} name must not be empty",
            kind
        )));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(DbError::InvalidCommand(format!(
            "Invalid {} name: '{}'",
            kind, name
        )));
    }
    Ok(())
}
