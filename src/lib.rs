//! # ChunkDB
//!
//! A lightweight document-oriented database daemon with:
//! - Chunked on-disk storage with a per-collection location index
//! - Schema-less JSON documents addressed `database/collection/_id`
//! - Predicate search: equality, inequality, range, and pattern operators
//! - Per-resource-key FIFO command ordering over a TCP protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Coordinator                               │
//! │            (FIFO queue per resource key)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Engine                                  │
//! │        (payload shapes, counts, query matching)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │  Chunk Store  │
//!               │ (chunks+index)│
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod coordinator;
pub mod engine;
pub mod network;
pub mod protocol;
pub mod query;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use coordinator::Coordinator;
pub use engine::Engine;
pub use error::{DbError, Result};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ChunkDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
