//! TCP Server
//!
//! Accepts connections and dispatches each to its own handler thread.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::{DbError, Result};
use crate::network::Connection;

/// How often the accept loop checks the shutdown flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// TCP server fronting the coordinator
pub struct Server {
    config: Config,
    coordinator: Arc<Coordinator>,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    /// Create a new server with the given config and coordinator
    pub fn new(config: Config, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            coordinator,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A handle that can signal shutdown from another thread
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Start the server (blocking).
    ///
    /// The listener is non-blocking so the accept loop can observe the
    /// shutdown flag between connection attempts.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            DbError::Network(format!(
                "Failed to bind {}: {}",
                self.config.listen_addr, e
            ))
        })?;
        listener.set_nonblocking(true)?;

        tracing::info!(addr = %self.config.listen_addr, "Server listening");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("Shutdown requested, stopping accept loop");
                return Ok(());
            }

            match listener.accept() {
                Ok((stream, addr)) => {
                    let active = self.active_connections.load(Ordering::SeqCst);
                    if active >= self.config.max_connections {
                        tracing::warn!(
                            peer = %addr,
                            active,
                            "Connection limit reached, refusing client"
                        );
                        drop(stream);
                        continue;
                    }
                    self.spawn_handler(stream, addr.to_string());
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                }
            }
        }
    }

    /// Signal the server to shut down gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn spawn_handler(&self, stream: std::net::TcpStream, peer: String) {
        // The per-connection stream goes back to blocking I/O
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!(peer = %peer, "Failed to configure stream: {}", e);
            return;
        }

        let coordinator = Arc::clone(&self.coordinator);
        let active = Arc::clone(&self.active_connections);
        let read_timeout = self.config.read_timeout_ms;
        let write_timeout = self.config.write_timeout_ms;

        active.fetch_add(1, Ordering::SeqCst);

        let builder = thread::Builder::new().name(format!("conn-{}", peer));
        let spawned = builder.spawn(move || {
            let result = Connection::new(stream, coordinator).and_then(|mut conn| {
                conn.set_timeouts(read_timeout, write_timeout)?;
                conn.handle()
            });
            if let Err(e) = result {
                tracing::warn!(peer = %peer, "Connection ended with error: {}", e);
            }
            active.fetch_sub(1, Ordering::SeqCst);
        });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn connection thread: {}", e);
            self.active_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
