//! Response definitions
//!
//! Represents responses to clients. The wire status byte mirrors the
//! `success` flag; the body carries the full response as JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x01,
}

/// Counts of resources affected by an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounts {
    pub databases: u64,
    pub collections: u64,
    pub documents: u64,
}

impl OpCounts {
    pub fn databases(n: u64) -> Self {
        Self {
            databases: n,
            ..Self::default()
        }
    }

    pub fn collections(n: u64) -> Self {
        Self {
            collections: n,
            ..Self::default()
        }
    }

    pub fn documents(n: u64) -> Self {
        Self {
            documents: n,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.databases == 0 && self.collections == 0 && self.documents == 0
    }

    pub fn merge(&mut self, other: OpCounts) {
        self.databases += other.databases;
        self.collections += other.collections;
        self.documents += other.documents;
    }
}

/// A response to send to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded
    pub success: bool,

    /// Human-readable outcome description
    pub message: String,

    /// Result data (read/search/list results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Resources affected (create/update/delete)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<OpCounts>,
}

impl Response {
    /// Create an OK response
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            counts: None,
        }
    }

    /// Create an OK response carrying result data
    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            counts: None,
        }
    }

    /// Create an OK response carrying affected-resource counts
    pub fn with_counts(message: impl Into<String>, counts: OpCounts) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            counts: Some(counts),
        }
    }

    /// Create an ERROR response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            counts: None,
        }
    }

    /// Wire status byte for this response
    pub fn status(&self) -> Status {
        if self.success {
            Status::Ok
        } else {
            Status::Error
        }
    }
}
