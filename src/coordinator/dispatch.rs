//! Command dispatch
//!
//! Per-resource-key FIFO queues over the engine. Each active key owns one
//! worker thread that drains its queue in arrival order; independent keys
//! run concurrently. Workers exit when their queue drains.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{DbError, Result};
use crate::protocol::{Command, CommandType, Response};

use super::key::ResourceKey;

/// A queued command plus where to deliver its response
struct Job {
    command: Command,
    reply: Sender<Response>,
}

/// Queue state for one active resource key.
///
/// The key's worker holds the implicit "busy" slot; the entry exists only
/// while a worker owns it, and is removed when the queue drains.
struct KeyQueue {
    pending: VecDeque<Job>,
}

/// The command coordinator
///
/// Validates commands, resolves their resource keys, and serializes
/// execution per key while letting unrelated keys proceed in parallel.
pub struct Coordinator {
    engine: Arc<Engine>,
    queues: Arc<Mutex<HashMap<ResourceKey, KeyQueue>>>,
}

impl Coordinator {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Submit a command for execution. The response is delivered through
    /// `reply`; a disconnected receiver drops the delivery but never the
    /// work.
    ///
    /// Structurally invalid commands fail here, before queueing, so they
    /// never occupy a queue slot.
    pub fn submit(&self, command: Command, reply: Sender<Response>) {
        if let Err(e) = validate(&command) {
            tracing::debug!(command = command.command_type.name(), error = %e, "Rejected before queueing");
            let _ = reply.send(Response::error(e.to_string()));
            return;
        }

        let key = ResourceKey::resolve(&command);
        let job = Job { command, reply };

        let mut queues = self.queues.lock();
        match queues.get_mut(&key) {
            Some(queue) => {
                // A worker owns this key: append behind it
                queue.pending.push_back(job);
            }
            None => {
                queues.insert(
                    key.clone(),
                    KeyQueue {
                        pending: VecDeque::new(),
                    },
                );
                if self.spawn_worker(key.clone(), job).is_err() {
                    // Roll back the reservation through the guard we already
                    // hold so the key is not wedged. The job's reply sender
                    // went down with the closure; the receiver observes the
                    // drop.
                    queues.remove(&key);
                }
            }
        }
    }

    /// Submit a command and block for its response. Used by tests and
    /// single-shot callers.
    pub fn execute(&self, command: Command) -> Response {
        let (tx, rx) = bounded(1);
        self.submit(command, tx);
        rx.recv()
            .unwrap_or_else(|_| Response::error("Coordinator worker dropped the response"))
    }

    /// Number of resource keys with an active worker
    pub fn active_keys(&self) -> usize {
        self.queues.lock().len()
    }

    /// Spawn the worker owning `key`. The caller still holds the queue map
    /// guard and rolls the reservation back if the spawn fails.
    fn spawn_worker(&self, key: ResourceKey, first: Job) -> std::io::Result<()> {
        let engine = Arc::clone(&self.engine);
        let queues = Arc::clone(&self.queues);

        let builder = thread::Builder::new().name("coord-worker".to_string());
        builder
            .spawn(move || {
                let mut job = first;
                loop {
                    let response = engine.dispatch(&job.command);
                    // A failed command releases the slot like any other
                    let _ = job.reply.send(response);

                    let mut map = queues.lock();
                    let queue = map.get_mut(&key).expect("worker owns its key entry");
                    match queue.pending.pop_front() {
                        Some(next) => job = next,
                        None => {
                            map.remove(&key);
                            break;
                        }
                    }
                }
            })
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn coordinator worker");
                e
            })
    }
}

/// Structural validation applied before a command may queue
fn validate(command: &Command) -> Result<()> {
    let payload = &command.payload;
    match command.command_type {
        CommandType::Ping => Ok(()),
        CommandType::Read | CommandType::List | CommandType::Export => {
            if payload.is_null() || payload.is_object() {
                Ok(())
            } else {
                Err(DbError::InvalidCommand(format!(
                    "{} payload must be an object",
                    command.command_type.name()
                )))
            }
        }
        CommandType::Create | CommandType::Update | CommandType::Delete => {
            match payload.as_object() {
                Some(obj) if !obj.is_empty() => Ok(()),
                _ => Err(DbError::InvalidCommand(format!(
                    "{} payload must be a non-empty object",
                    command.command_type.name()
                ))),
            }
        }
        CommandType::Search => {
            if payload.is_object() {
                Ok(())
            } else {
                Err(DbError::InvalidCommand(
                    "search payload must be an object".to_string(),
                ))
            }
        }
    }
}
