//! Storage Module
//!
//! Chunked persistent storage for schema-less documents.
//!
//! ## Responsibilities
//! - Group documents into fixed-capacity chunks per collection
//! - Maintain the per-collection id -> (chunk, slot) location index
//! - Rebuild indexes from chunk contents on startup
//! - Point lookup, full scan, and slot reclamation
//!
//! ## Why Chunks
//! One file per document means one open/parse per read and thousands of tiny
//! files per collection. Grouping documents into bounded chunks amortizes
//! that cost: one handle and one index rebuild per chunk, O(1) id lookup via
//! the location index, and sequential reads for scans. The trade-off is a
//! small bound on wasted space in partially filled chunks.

mod chunk;
mod store;

pub use chunk::{Chunk, Slot, CHUNK_FORMAT_VERSION, CHUNK_HEADER_SIZE, CHUNK_MAGIC};
pub use store::{ChunkStore, ListAll};

use std::time::{SystemTime, UNIX_EPOCH};

/// Location of a document: chunk number + slot within the chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocLocation {
    /// Chunk number within the collection (0-based)
    pub chunk: usize,

    /// Slot index within the chunk
    pub slot: usize,
}

/// Generate a document id: 8 hex chars of unix seconds + 16 random hex chars.
///
/// The timestamp prefix keeps ids roughly sortable by creation time; the
/// random suffix makes collisions within a collection negligible (and inserts
/// still verify uniqueness against the index).
pub fn generate_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let noise: [u8; 8] = rand::random();

    let mut id = String::with_capacity(24);
    id.push_str(&format!("{:08x}", (secs & 0xffff_ffff) as u32));
    for byte in noise {
        id.push_str(&format!("{:02x}", byte));
    }
    id
}
