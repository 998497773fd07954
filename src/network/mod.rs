//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One handler thread per connection
//! - Commands routed through the Coordinator

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
