//! Resource keys
//!
//! Identifies the most specific resource a command touches. Commands with
//! the same key execute in arrival order; commands with different keys may
//! run concurrently.

use serde_json::Value;

use crate::protocol::{Command, CommandType};
use crate::query::{is_pattern_key, CompareOp, NameFilter};

/// The resource a command serializes on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// The whole store: multi-target payloads, name filters, pings
    Root,
    Database(String),
    Collection(String, String),
    Document(String, String, String),
}

/// How deep a command's key may resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Collection,
    Document,
}

impl ResourceKey {
    /// Resolve a command to its resource key.
    ///
    /// The payload is walked down the resource hierarchy as long as each
    /// level names exactly one plain resource. A filter key, an operator
    /// key, or multiple siblings widen the key to the enclosing scope.
    /// Rename markers (`old#`) key under the old name. Create and search
    /// stop at collection depth: their innermost keys are payload, not
    /// document identities.
    pub fn resolve(command: &Command) -> Self {
        match command.command_type {
            CommandType::Ping => Self::Root,
            CommandType::Create => Self::from_shape(&command.payload, Depth::Collection),
            CommandType::Search => {
                // Unwrap the pagination envelope if present
                let payload = command
                    .payload
                    .get("data")
                    .unwrap_or(&command.payload);
                Self::from_shape(payload, Depth::Collection)
            }
            _ => Self::from_shape(&command.payload, Depth::Document),
        }
    }

    fn from_shape(payload: &Value, max_depth: Depth) -> Self {
        let Some(obj) = payload.as_object() else {
            return Self::Root;
        };
        if obj.len() != 1 {
            return Self::Root;
        }
        let (db_key, db_spec) = obj.iter().next().expect("length checked");
        if is_widening_key(db_key) {
            return Self::Root;
        }
        let db = trim_marker(db_key);
        // A database rename keys under the old name, whatever its value
        if db != db_key {
            return Self::Database(db.to_string());
        }

        let Some(collections) = db_spec.as_object() else {
            return Self::Database(db.to_string());
        };
        if collections.len() != 1 {
            return Self::Database(db.to_string());
        }
        let (coll_key, coll_spec) = collections.iter().next().expect("length checked");
        if is_widening_key(coll_key) {
            return Self::Database(db.to_string());
        }
        let coll = trim_marker(coll_key);
        // A collection rename serializes on the collection being renamed
        if coll != coll_key || max_depth == Depth::Collection {
            return Self::Collection(db.to_string(), coll.to_string());
        }

        match coll_spec {
            Value::String(id) => {
                Self::Document(db.to_string(), coll.to_string(), id.clone())
            }
            Value::Object(docs) if docs.contains_key("collectionKey") => {
                // Bulk wrapper: touches every matching collection
                Self::Database(db.to_string())
            }
            Value::Object(docs) if docs.len() == 1 => {
                let (doc_key, _) = docs.iter().next().expect("length checked");
                if is_widening_key(doc_key) {
                    Self::Collection(db.to_string(), coll.to_string())
                } else {
                    Self::Document(db.to_string(), coll.to_string(), doc_key.clone())
                }
            }
            _ => Self::Collection(db.to_string(), coll.to_string()),
        }
    }
}

/// Keys that address more than one resource, or none directly
fn is_widening_key(key: &str) -> bool {
    key == "$field"
        || key == "collectionKey"
        || key == "docsObj"
        || CompareOp::parse(key).is_some()
        || NameFilter::applies_to(key)
        || is_pattern_key(key)
}

/// Strip a trailing rename marker so renames queue under the old name
fn trim_marker(key: &str) -> &str {
    key.strip_suffix('#').filter(|k| !k.is_empty()).unwrap_or(key)
}
