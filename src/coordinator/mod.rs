//! Coordinator Module
//!
//! Orders command execution per resource key.
//!
//! ## Responsibilities
//! - Resolve each command to the most specific resource it touches
//! - Serialize commands on the same key in arrival order (FIFO)
//! - Run commands on unrelated keys concurrently
//! - Reject structurally invalid commands before they queue

mod dispatch;
mod key;

pub use dispatch::Coordinator;
pub use key::ResourceKey;
