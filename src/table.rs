//! Handle allocation and the connection registry.
//!
//! The table is the only mutable registry in the crate: it maps opaque
//! integer handles to live connections. Handles are allocated monotonically
//! and never reused for the lifetime of the process, so a stale handle can
//! never alias a newer connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::connection::Connection;
use crate::session::Session;

/// Opaque identifier for a live or recently-live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The raw integer value, for embedding in FFI-style call surfaces.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry of connections keyed by handle.
pub(crate) struct ConnectionTable<S: Session> {
    entries: Mutex<HashMap<u64, Connection<S>>>,
    next_handle: AtomicU64,
}

impl<S: Session> ConnectionTable<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Allocate the next handle and register `connection` under it.
    pub(crate) fn insert(&self, connection: Connection<S>) -> Handle {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .expect("table lock")
            .insert(handle.0, connection);
        handle
    }

    /// Look up a connection. Pure read; unknown handles yield `None`.
    pub(crate) fn lookup(&self, handle: Handle) -> Option<Connection<S>> {
        self.entries
            .lock()
            .expect("table lock")
            .get(&handle.0)
            .cloned()
    }

    /// Detach a connection from the table, returning it for teardown.
    pub(crate) fn remove(&self, handle: Handle) -> Option<Connection<S>> {
        self.entries.lock().expect("table lock").remove(&handle.0)
    }
}
