//! Chunk representation and on-disk codec
//!
//! A chunk is a bounded-capacity array of document slots belonging to one
//! collection. Chunks are persisted whole: mutations rewrite the chunk file.
//!
//! ## File Format
//!
//! ```text
//! ┌───────────┬─────────┬──────────┬──────────┬──────────────────┐
//! │ Magic (4) │ Ver (1) │ CRC (4)  │ Len (4)  │   Body (bincode) │
//! └───────────┴─────────┴──────────┴──────────┴──────────────────┘
//! ```
//!
//! The body is a bincode-encoded slot vector. Documents are stored as raw
//! JSON bytes inside the body because bincode is not self-describing and
//! cannot round-trip `serde_json::Value` directly.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DbError, Result};

/// Magic bytes identifying a chunk file
pub const CHUNK_MAGIC: [u8; 4] = *b"CHNK";

/// Current chunk file format version
pub const CHUNK_FORMAT_VERSION: u8 = 1;

/// Header size: magic (4) + version (1) + crc (4) + body length (4)
pub const CHUNK_HEADER_SIZE: usize = 13;

/// An occupied document slot
#[derive(Debug, Clone)]
pub struct Slot {
    /// Document id, unique within the collection
    pub id: String,

    /// The document itself
    pub document: Value,
}

/// In-memory chunk state
///
/// Slots keep their position for the lifetime of a document: updates happen
/// in place and deletions leave a hole that later inserts may reuse.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    slots: Vec<Option<Slot>>,
    live: usize,
}

/// Serialized form of a slot (document as raw JSON bytes)
#[derive(Serialize, Deserialize)]
struct SlotRecord {
    id: String,
    doc: Vec<u8>,
}

impl Chunk {
    /// Create a new empty chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live documents in this chunk
    pub fn live(&self) -> usize {
        self.live
    }

    /// True if the chunk holds no live documents
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Insert a document, reusing the first freed slot if one exists.
    ///
    /// Returns the slot index, or `None` if the chunk is at capacity.
    pub fn insert(&mut self, id: String, document: Value, capacity: usize) -> Option<usize> {
        // Reuse a hole left by a deletion
        if let Some(idx) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[idx] = Some(Slot { id, document });
            self.live += 1;
            return Some(idx);
        }

        if self.slots.len() >= capacity {
            return None;
        }

        self.slots.push(Some(Slot { id, document }));
        self.live += 1;
        Some(self.slots.len() - 1)
    }

    /// Get the slot at `idx` if occupied
    pub fn slot(&self, idx: usize) -> Option<&Slot> {
        self.slots.get(idx).and_then(|s| s.as_ref())
    }

    /// Mutable access to the document at `idx`
    pub fn document_mut(&mut self, idx: usize) -> Option<&mut Value> {
        self.slots
            .get_mut(idx)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.document)
    }

    /// Free the slot at `idx`, returning its contents
    pub fn remove(&mut self, idx: usize) -> Option<Slot> {
        let slot = self.slots.get_mut(idx)?.take()?;
        self.live -= 1;
        Some(slot)
    }

    /// Iterate occupied slots in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.as_ref().map(|slot| (idx, slot)))
    }

    /// Number of slots allocated (occupied or freed)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    // =========================================================================
    // Codec
    // =========================================================================

    /// Encode this chunk to its on-disk representation
    pub fn encode(&self) -> Result<Vec<u8>> {
        let records: Vec<Option<SlotRecord>> = self
            .slots
            .iter()
            .map(|s| {
                s.as_ref()
                    .map(|slot| {
                        Ok(SlotRecord {
                            id: slot.id.clone(),
                            doc: serde_json::to_vec(&slot.document)?,
                        })
                    })
                    .transpose()
            })
            .collect::<Result<_>>()?;

        let body = bincode::serialize(&records)?;
        let crc = crc32fast::hash(&body);

        let mut bytes = Vec::with_capacity(CHUNK_HEADER_SIZE + body.len());
        bytes.extend_from_slice(&CHUNK_MAGIC);
        bytes.push(CHUNK_FORMAT_VERSION);
        bytes.extend_from_slice(&crc.to_be_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);

        Ok(bytes)
    }

    /// Decode a chunk from its on-disk representation
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(DbError::Storage(format!(
                "Chunk file too short: {} bytes",
                bytes.len()
            )));
        }

        if bytes[0..4] != CHUNK_MAGIC {
            return Err(DbError::Storage("Bad chunk magic".to_string()));
        }

        let version = bytes[4];
        if version != CHUNK_FORMAT_VERSION {
            return Err(DbError::Storage(format!(
                "Unsupported chunk format version: {}",
                version
            )));
        }

        let crc = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        let body_len = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;

        let body = &bytes[CHUNK_HEADER_SIZE..];
        if body.len() != body_len {
            return Err(DbError::Storage(format!(
                "Chunk body length mismatch: header says {}, found {}",
                body_len,
                body.len()
            )));
        }

        if crc32fast::hash(body) != crc {
            return Err(DbError::Storage("Chunk CRC mismatch".to_string()));
        }

        let records: Vec<Option<SlotRecord>> = bincode::deserialize(body)?;

        let mut live = 0;
        let mut slots = Vec::with_capacity(records.len());
        for record in records {
            match record {
                Some(r) => {
                    let document: Value = serde_json::from_slice(&r.doc)?;
                    slots.push(Some(Slot { id: r.id, document }));
                    live += 1;
                }
                None => slots.push(None),
            }
        }

        Ok(Self { slots, live })
    }

    /// Write this chunk to `path` (write-then-ack durability)
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a chunk from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }
}
