//! Engine Module
//!
//! The storage engine facade: interprets command payloads and translates
//! them into chunk-store operations.
//!
//! ## Responsibilities
//! - Own the chunk store (explicit construction, no globals)
//! - Interpret the nested payload shapes for create/read/update/delete
//! - Run search and list over name filters and document predicates
//! - Dump subtrees as nested export objects
//! - Report affected-resource counts for every mutation
//!
//! ## Payload Shapes
//! Payloads are nested JSON objects mirroring the resource hierarchy:
//! `{database: {collection: {document-key: fields}}}`. The innermost
//! position is duck-typed: it may be a document, a predicate, an id map, or
//! a rename marker (a key with a `#` suffix). Classification happens up
//! front so a malformed payload fails before any side effect.

use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::error::{DbError, Result};
use crate::protocol::{Command, CommandType, OpCounts, Response};
use crate::query::{is_pattern_key, matches_query, CompareOp, DocQuery, NameFilter, Pattern};
use crate::storage::ChunkStore;

/// Default page size for paginated search
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// The storage engine facade
pub struct Engine {
    config: Config,
    store: ChunkStore,
}

impl Engine {
    /// Open or create an engine with the given config.
    ///
    /// Startup scans the data directory and rebuilds every collection's
    /// location index from chunk contents.
    pub fn open(config: Config) -> Result<Self> {
        let store = ChunkStore::open(&config.data_dir, config.chunk_capacity)?;
        tracing::info!(
            data_dir = %config.data_dir.display(),
            chunk_capacity = config.chunk_capacity,
            "Engine opened"
        );
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Execute a command and produce its response. Errors become error
    /// responses; they never escape to the caller.
    pub fn dispatch(&self, command: &Command) -> Response {
        let verb = command.command_type.name();
        let result = match command.command_type {
            CommandType::Create => self
                .create(&command.payload)
                .map(|counts| Response::with_counts("Create applied", counts)),
            CommandType::Read => self
                .read(&command.payload)
                .map(|data| Response::with_data("Read ok", data)),
            CommandType::Update => self
                .update(&command.payload)
                .map(|counts| Response::with_counts("Update applied", counts)),
            CommandType::Delete => self
                .delete(&command.payload)
                .map(|counts| Response::with_counts("Delete applied", counts)),
            CommandType::Search => self
                .search(&command.payload)
                .map(|data| Response::with_data("Search ok", data)),
            CommandType::List => self
                .list(&command.payload)
                .map(|data| Response::with_data("List ok", data)),
            CommandType::Ping => Ok(Response::ok("pong")),
            CommandType::Export => self
                .export(&command.payload)
                .map(|data| Response::with_data("Export ok", data)),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(command = verb, error = %e, "Command failed");
                Response::error(e.to_string())
            }
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Create databases, collections, and documents from a nested payload.
    ///
    /// Additive and idempotent at the resource level: existing databases and
    /// collections are reused, not errors, and only newly created resources
    /// are counted. The whole payload is validated before anything is
    /// touched.
    pub fn create(&self, payload: &Value) -> Result<OpCounts> {
        let obj = as_object(payload, "create")?;
        if obj.is_empty() {
            return Err(DbError::InvalidCommand(
                "create payload must name at least one database".to_string(),
            ));
        }
        validate_create(obj)?;

        let mut counts = OpCounts::default();
        for (db, db_spec) in obj {
            if self.store.create_database(db)? {
                counts.databases += 1;
            }
            let collections = db_spec.as_object().expect("validated create payload");
            for (coll, coll_spec) in collections {
                if self.store.create_collection(db, coll)? {
                    counts.collections += 1;
                }
                let documents = coll_spec.as_object().expect("validated create payload");
                for document in documents.values() {
                    self.store.insert(db, coll, document.clone())?;
                    counts.documents += 1;
                }
            }
        }
        Ok(counts)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Read a resource path: databases, a database's collections, every
    /// document in a collection, or a single document by id.
    pub fn read(&self, payload: &Value) -> Result<Value> {
        if payload.is_null() {
            return Ok(json!({ "databases": self.store.list_databases() }));
        }
        let obj = as_object(payload, "read")?;
        if obj.is_empty() {
            return Ok(json!({ "databases": self.store.list_databases() }));
        }
        if obj.len() != 1 {
            return Err(DbError::InvalidCommand(
                "read targets exactly one path".to_string(),
            ));
        }

        let (db, db_spec) = obj.iter().next().expect("length checked");
        let collections = db_spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!("read spec for database '{}' must be an object", db))
        })?;

        if collections.is_empty() {
            if !self.store.database_exists(db) {
                return Err(DbError::NotFound(format!("Database '{}' not found", db)));
            }
            return Ok(json!({
                "database": db,
                "collections": self.store.list_collections(db),
            }));
        }
        if collections.len() != 1 {
            return Err(DbError::InvalidCommand(
                "read targets exactly one path".to_string(),
            ));
        }

        let (coll, coll_spec) = collections.iter().next().expect("length checked");
        match coll_spec {
            // {db: {coll: "id"}}
            Value::String(id) => self.store.get(db, coll, id),
            Value::Object(inner) if inner.is_empty() => {
                let documents: Vec<Value> =
                    self.store.list_all(db, coll)?.map(|(_, doc)| doc).collect();
                Ok(json!({
                    "database": db,
                    "collection": coll,
                    "count": documents.len(),
                    "documents": documents,
                }))
            }
            // {db: {coll: {id: {}}}}
            Value::Object(inner) if inner.len() == 1 => {
                let (id, rest) = inner.iter().next().expect("length checked");
                if !rest.as_object().is_some_and(Map::is_empty) {
                    return Err(DbError::InvalidCommand(
                        "read document spec must be an empty object".to_string(),
                    ));
                }
                self.store.get(db, coll, id)
            }
            _ => Err(DbError::InvalidCommand(
                "read targets exactly one path".to_string(),
            )),
        }
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Apply renames and document merges.
    ///
    /// A key with a `#` suffix renames the named resource to the string
    /// value: `{"old#": "new"}` at database level, `{db: {"old#": "new"}}`
    /// at collection level. Document entries `{db: {coll: {id: fields}}}`
    /// shallow-merge `fields` into the stored document.
    pub fn update(&self, payload: &Value) -> Result<OpCounts> {
        let obj = as_object(payload, "update")?;
        if obj.is_empty() {
            return Err(DbError::InvalidCommand(
                "update payload must name a target".to_string(),
            ));
        }

        let mut counts = OpCounts::default();
        for (key, value) in obj {
            if let Some(old_name) = rename_marker(key) {
                let new_name = rename_target(key, value)?;
                self.store.rename_database(old_name, new_name)?;
                counts.databases += 1;
            } else {
                counts.merge(self.update_in_database(key, value)?);
            }
        }
        Ok(counts)
    }

    fn update_in_database(&self, db: &str, spec: &Value) -> Result<OpCounts> {
        let obj = spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!(
                "update spec for database '{}' must be an object",
                db
            ))
        })?;

        let mut counts = OpCounts::default();
        for (key, value) in obj {
            if let Some(old_name) = rename_marker(key) {
                let new_name = rename_target(key, value)?;
                self.store.rename_collection(db, old_name, new_name)?;
                counts.collections += 1;
            } else {
                let documents = value.as_object().ok_or_else(|| {
                    DbError::InvalidCommand(format!(
                        "update spec for collection '{}' must be an object",
                        key
                    ))
                })?;
                for (id, fields) in documents {
                    self.store.update(db, key, id, fields)?;
                    counts.documents += 1;
                }
            }
        }
        Ok(counts)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete resources named by the payload.
    ///
    /// Accepted shapes, all idempotent (absent targets count zero):
    /// - `{"==": name}` / `{"~frag": {}}` — databases matching a name filter
    /// - `{db: {}}` — a whole database
    /// - `{db: {"==": name}}` / `{db: {"^frag": {}}}` — matching collections
    /// - `{db: {label: {collectionKey: key, docsObj: query}}}` — documents
    ///   matching `query` across every collection matching `key` (the label
    ///   is ignored; the wrapper is also accepted directly under the
    ///   database). An empty or absent `docsObj` deletes the matching
    ///   collections themselves
    /// - `{db: {coll: {}}}` — a whole collection
    /// - `{db: {coll: {id1: {}, id2: {}}}}` — documents by id
    /// - `{db: {coll: predicate}}` — documents matching a predicate
    pub fn delete(&self, payload: &Value) -> Result<OpCounts> {
        let obj = as_object(payload, "delete")?;
        if obj.is_empty() {
            return Err(DbError::InvalidCommand(
                "delete payload must name a target".to_string(),
            ));
        }

        let mut counts = OpCounts::default();
        for (key, value) in obj {
            if NameFilter::applies_to(key) {
                let filter = NameFilter::parse(key, value)?;
                for db in self.store.list_databases() {
                    if filter.matches(&db) && self.store.delete_database(&db)? {
                        counts.databases += 1;
                    }
                }
            } else {
                counts.merge(self.delete_in_database(key, value)?);
            }
        }
        Ok(counts)
    }

    fn delete_in_database(&self, db: &str, spec: &Value) -> Result<OpCounts> {
        let obj = spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!(
                "delete spec for database '{}' must be an object",
                db
            ))
        })?;

        if obj.is_empty() {
            return Ok(if self.store.delete_database(db)? {
                OpCounts::databases(1)
            } else {
                OpCounts::default()
            });
        }

        if obj.contains_key("collectionKey") {
            return self.delete_bulk(db, obj);
        }

        let mut counts = OpCounts::default();
        for (key, value) in obj {
            if NameFilter::applies_to(key) {
                let filter = NameFilter::parse(key, value)?;
                for coll in self.store.list_collections(db) {
                    if filter.matches(&coll) && self.store.delete_collection(db, &coll)? {
                        counts.collections += 1;
                    }
                }
            } else {
                counts.merge(self.delete_in_collection(db, key, value)?);
            }
        }
        Ok(counts)
    }

    /// `{collectionKey: key, docsObj: query}`: delete documents matching
    /// `query` in every collection whose name matches `key`. An empty or
    /// absent `docsObj` deletes the matching collections outright.
    fn delete_bulk(&self, db: &str, obj: &Map<String, Value>) -> Result<OpCounts> {
        for key in obj.keys() {
            if key != "collectionKey" && key != "docsObj" {
                return Err(DbError::InvalidCommand(format!(
                    "Unexpected key '{}' beside \"collectionKey\"",
                    key
                )));
            }
        }
        let coll_key = obj["collectionKey"].as_str().ok_or_else(|| {
            DbError::InvalidCommand("\"collectionKey\" must be a string".to_string())
        })?;
        let names = names_matching_key(self.store.list_collections(db), coll_key)?;

        let docs_query = obj.get("docsObj").cloned().unwrap_or_else(|| json!({}));
        if docs_query.as_object().is_some_and(Map::is_empty) {
            let mut removed = 0u64;
            for coll in names {
                if self.store.delete_collection(db, &coll)? {
                    removed += 1;
                }
            }
            return Ok(OpCounts::collections(removed));
        }

        let query = DocQuery::classify(&docs_query)?;
        let mut deleted = 0u64;
        for coll in names {
            deleted += self.delete_matching(db, &coll, &query)? as u64;
        }
        Ok(OpCounts::documents(deleted))
    }

    fn delete_in_collection(&self, db: &str, coll: &str, spec: &Value) -> Result<OpCounts> {
        let obj = spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!(
                "delete spec for collection '{}' must be an object",
                coll
            ))
        })?;

        // `{db: {label: {collectionKey, docsObj}}}` — the label carries no
        // meaning, the wrapper selects the collections itself
        if obj.contains_key("collectionKey") {
            return self.delete_bulk(db, obj);
        }

        if obj.is_empty() {
            return Ok(if self.store.delete_collection(db, coll)? {
                OpCounts::collections(1)
            } else {
                OpCounts::default()
            });
        }

        // An id map has only empty-object values and no predicate keys
        let id_map = obj
            .values()
            .all(|v| v.as_object().is_some_and(Map::is_empty))
            && !obj.keys().any(|k| {
                k == "$field" || CompareOp::parse(k).is_some() || is_pattern_key(k)
            });
        if id_map {
            let mut deleted = 0u64;
            for id in obj.keys() {
                if self.store.contains(db, coll, id) {
                    self.store.delete(db, coll, id)?;
                    deleted += 1;
                }
            }
            return Ok(OpCounts::documents(deleted));
        }

        let query = DocQuery::classify(spec)?;
        Ok(OpCounts::documents(
            self.delete_matching(db, coll, &query)? as u64,
        ))
    }

    /// Delete every document in a collection matching a predicate. An absent
    /// collection deletes nothing.
    fn delete_matching(&self, db: &str, coll: &str, query: &DocQuery) -> Result<usize> {
        let scan = match self.store.list_all(db, coll) {
            Ok(scan) => scan,
            Err(DbError::NotFound(_)) => return Ok(0),
            Err(e) => return Err(e),
        };

        // Evaluate fully before deleting so a bad predicate applies nothing
        let mut ids = Vec::new();
        for (id, document) in scan {
            if matches_query(&document, query)? {
                ids.push(id);
            }
        }
        for id in &ids {
            self.store.delete(db, coll, id)?;
        }
        Ok(ids.len())
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search documents matching a predicate, grouped per collection.
    ///
    /// Database and collection positions accept literal names or pattern
    /// keys. The payload may be wrapped as `{data, pageNumber, limit}` for
    /// pagination (limit defaults to 10); `count` always reports total
    /// matches before pagination.
    pub fn search(&self, payload: &Value) -> Result<Value> {
        let obj = as_object(payload, "search")?;

        let (query_payload, page_limit) = if obj.contains_key("data") {
            let page = obj
                .get("pageNumber")
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .max(1) as usize;
            let limit = obj
                .get("limit")
                .and_then(Value::as_u64)
                .map(|l| l as usize)
                .unwrap_or(DEFAULT_SEARCH_LIMIT);
            let data = obj["data"].as_object().ok_or_else(|| {
                DbError::InvalidQuery("\"data\" must be an object".to_string())
            })?;
            (data, Some((page, limit)))
        } else {
            (obj, None)
        };

        let mut groups = Vec::new();
        for (db_key, db_spec) in query_payload {
            for db in names_matching_key(self.store.list_databases(), db_key)? {
                self.search_database(&db, db_spec, page_limit, &mut groups)?;
            }
        }
        Ok(Value::Array(groups))
    }

    fn search_database(
        &self,
        db: &str,
        spec: &Value,
        page_limit: Option<(usize, usize)>,
        groups: &mut Vec<Value>,
    ) -> Result<()> {
        let obj = spec.as_object().ok_or_else(|| {
            DbError::InvalidQuery(format!(
                "search spec for database '{}' must be an object",
                db
            ))
        })?;

        if obj.is_empty() {
            // Every collection, every document
            for coll in self.store.list_collections(db) {
                groups.push(self.search_collection(db, &coll, &DocQuery::All, page_limit)?);
            }
            return Ok(());
        }

        for (coll_key, query_value) in obj {
            let query = DocQuery::classify(query_value)?;
            for coll in names_matching_key(self.store.list_collections(db), coll_key)? {
                groups.push(self.search_collection(db, &coll, &query, page_limit)?);
            }
        }
        Ok(())
    }

    fn search_collection(
        &self,
        db: &str,
        coll: &str,
        query: &DocQuery,
        page_limit: Option<(usize, usize)>,
    ) -> Result<Value> {
        let mut matched = Vec::new();
        for (_, document) in self.store.list_all(db, coll)? {
            if matches_query(&document, query)? {
                matched.push(document);
            }
        }
        let total = matched.len();
        let documents: Vec<Value> = match page_limit {
            Some((page, limit)) => matched
                .into_iter()
                .skip((page - 1).saturating_mul(limit))
                .take(limit)
                .collect(),
            None => matched,
        };
        Ok(json!({
            "database": db,
            "collection": coll,
            "count": total,
            "documents": documents,
        }))
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Dump a subtree as one nested object: `{db: {coll: {id: doc}}}`.
    ///
    /// A null or empty payload exports every database; `{db: {}}` exports one
    /// database; `{db: {coll: {}}}` exports one collection.
    pub fn export(&self, payload: &Value) -> Result<Value> {
        let obj = match payload {
            Value::Null => None,
            _ => Some(as_object(payload, "export")?),
        };

        let obj = match obj {
            None => None,
            Some(obj) if obj.is_empty() => None,
            Some(obj) => Some(obj),
        };

        let Some(obj) = obj else {
            let mut dump = Map::new();
            for db in self.store.list_databases() {
                let databases = self.export_database(&db)?;
                dump.insert(db, Value::Object(databases));
            }
            return Ok(Value::Object(dump));
        };

        if obj.len() != 1 {
            return Err(DbError::InvalidCommand(
                "export targets exactly one path".to_string(),
            ));
        }
        let (db, db_spec) = obj.iter().next().expect("length checked");
        let collections = db_spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!(
                "export spec for database '{}' must be an object",
                db
            ))
        })?;

        if collections.is_empty() {
            if !self.store.database_exists(db) {
                return Err(DbError::NotFound(format!("Database '{}' not found", db)));
            }
            return Ok(json!({ db.as_str(): self.export_database(db)? }));
        }
        if collections.len() != 1 {
            return Err(DbError::InvalidCommand(
                "export targets exactly one path".to_string(),
            ));
        }

        let (coll, coll_spec) = collections.iter().next().expect("length checked");
        if !coll_spec.as_object().is_some_and(Map::is_empty) {
            return Err(DbError::InvalidCommand(
                "export collection spec must be an empty object".to_string(),
            ));
        }
        let documents = self.export_collection(db, coll)?;
        Ok(json!({ db.as_str(): { coll.as_str(): documents } }))
    }

    fn export_database(&self, db: &str) -> Result<Map<String, Value>> {
        let mut collections = Map::new();
        for coll in self.store.list_collections(db) {
            let documents = self.export_collection(db, &coll)?;
            collections.insert(coll, Value::Object(documents));
        }
        Ok(collections)
    }

    fn export_collection(&self, db: &str, coll: &str) -> Result<Map<String, Value>> {
        let mut documents = Map::new();
        for (id, document) in self.store.list_all(db, coll)? {
            documents.insert(id, document);
        }
        Ok(documents)
    }

    // =========================================================================
    // List
    // =========================================================================

    /// Enumerate names at a resource path: databases, a database's
    /// collections, or a collection's document ids (with a count).
    pub fn list(&self, payload: &Value) -> Result<Value> {
        if payload.is_null() {
            return Ok(json!({ "databases": self.store.list_databases() }));
        }
        let obj = as_object(payload, "list")?;
        if obj.is_empty() {
            return Ok(json!({ "databases": self.store.list_databases() }));
        }
        if obj.len() != 1 {
            return Err(DbError::InvalidCommand(
                "list targets exactly one path".to_string(),
            ));
        }

        let (db, db_spec) = obj.iter().next().expect("length checked");
        let collections = db_spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!("list spec for database '{}' must be an object", db))
        })?;

        if collections.is_empty() {
            if !self.store.database_exists(db) {
                return Err(DbError::NotFound(format!("Database '{}' not found", db)));
            }
            return Ok(json!({
                "database": db,
                "collections": self.store.list_collections(db),
            }));
        }
        if collections.len() != 1 {
            return Err(DbError::InvalidCommand(
                "list targets exactly one path".to_string(),
            ));
        }

        let (coll, coll_spec) = collections.iter().next().expect("length checked");
        if !coll_spec.as_object().is_some_and(Map::is_empty) {
            return Err(DbError::InvalidCommand(
                "list collection spec must be an empty object".to_string(),
            ));
        }
        let ids: Vec<String> = self.store.list_all(db, coll)?.map(|(id, _)| id).collect();
        Ok(json!({
            "database": db,
            "collection": coll,
            "count": ids.len(),
            "documents": ids,
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn as_object<'a>(payload: &'a Value, verb: &str) -> Result<&'a Map<String, Value>> {
    payload.as_object().ok_or_else(|| {
        DbError::InvalidCommand(format!("{} payload must be an object", verb))
    })
}

/// Check every level of a create payload before applying any of it
fn validate_create(payload: &Map<String, Value>) -> Result<()> {
    for (db, db_spec) in payload {
        let collections = db_spec.as_object().ok_or_else(|| {
            DbError::InvalidCommand(format!(
                "create spec for database '{}' must be an object",
                db
            ))
        })?;
        for (coll, coll_spec) in collections {
            let documents = coll_spec.as_object().ok_or_else(|| {
                DbError::InvalidCommand(format!(
                    "create spec for collection '{}' must be an object",
                    coll
                ))
            })?;
            for (key, document) in documents {
                if !document.is_object() {
                    return Err(DbError::InvalidCommand(format!(
                        "Document '{}' must be an object",
                        key
                    )));
                }
            }
        }
    }
    Ok(())
}

/// The old name behind a `#` rename marker, if the key carries one
fn rename_marker(key: &str) -> Option<&str> {
    key.strip_suffix('#').filter(|old| !old.is_empty())
}

fn rename_target<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        DbError::InvalidCommand(format!("Rename '{}' requires a string target name", key))
    })
}

/// Names selected by a key that is either a literal name or a pattern
fn names_matching_key(names: Vec<String>, key: &str) -> Result<Vec<String>> {
    if is_pattern_key(key) {
        let pattern = Pattern::compile(key)?;
        Ok(names.into_iter().filter(|n| pattern.matches(n)).collect())
    } else {
        Ok(names.into_iter().filter(|n| n == key).collect())
    }
}
