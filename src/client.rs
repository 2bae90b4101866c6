//! Public transport facade.
//!
//! [`Transport`] is the entry surface the embedding application calls:
//! connect, disconnect, state, max-datagram-size, send, receive. Every
//! operation validates the handle against the connection table; an unknown
//! or already-removed handle is a benign no-op or sentinel, never an error
//! that reaches the caller.

use std::sync::Arc;

use tracing::debug;

use crate::connection::{Connection, TransportState};
use crate::core::{ConfigError, TransportConfig};
use crate::pool::BufferPool;
use crate::session::Dialer;
use crate::table::{ConnectionTable, Handle};

/// Client-side multiplexed transport: many logical connections, one dialer.
///
/// Methods are synchronous and non-blocking; connection establishment and
/// all I/O run on background tasks, so a `Transport` must live inside a
/// tokio runtime. The caller polls [`Transport::state`] and
/// [`Transport::receive`].
pub struct Transport<D: Dialer> {
    dialer: Arc<D>,
    table: ConnectionTable<D::Session>,
    pool: Arc<BufferPool>,
}

impl<D: Dialer> Transport<D> {
    /// Create a transport that opens sessions through `dialer`.
    pub fn new(dialer: D) -> Self {
        Self {
            dialer: Arc::new(dialer),
            table: ConnectionTable::new(),
            pool: BufferPool::new(),
        }
    }

    /// Open a logical connection and return its handle immediately.
    ///
    /// Establishment is asynchronous: the handle starts in Connecting and
    /// the caller observes the outcome by polling [`Transport::state`].
    pub fn connect(&self, config: TransportConfig) -> Handle {
        let connection =
            Connection::spawn(Arc::clone(&self.dialer), config, Arc::clone(&self.pool));
        let handle = self.table.insert(connection);
        debug!(%handle, "connection created");
        handle
    }

    /// Parse, validate, and connect from the JSON configuration document.
    ///
    /// Invalid configuration is rejected here, before any handle exists.
    pub fn connect_json(&self, json: &str) -> Result<Handle, ConfigError> {
        let config = TransportConfig::from_json(json)?;
        Ok(self.connect(config))
    }

    /// Tear down a connection and forget its handle. Idempotent.
    pub fn disconnect(&self, handle: Handle) {
        if let Some(connection) = self.table.remove(handle) {
            debug!(%handle, "disconnecting");
            connection.close();
        }
    }

    /// Lifecycle state of `handle`; unknown handles read as Closed.
    pub fn state(&self, handle: Handle) -> TransportState {
        match self.table.lookup(handle) {
            Some(connection) => connection.state(),
            None => TransportState::Closed,
        }
    }

    /// Negotiated maximum datagram payload for `handle`; 0 unless Connected.
    pub fn max_datagram_size(&self, handle: Handle) -> usize {
        match self.table.lookup(handle) {
            Some(connection) => connection.max_datagram_size(),
            None => 0,
        }
    }

    /// Queue one message, datagram or reliable. Fire-and-forget: silently
    /// dropped if the connection is not Connected or the handle is unknown.
    pub fn send(&self, handle: Handle, payload: &[u8], reliable: bool) {
        if let Some(connection) = self.table.lookup(handle) {
            connection.send(payload, reliable);
        }
    }

    /// Pop the next inbound message for `handle`, if any. The caller owns
    /// the returned bytes.
    pub fn receive(&self, handle: Handle) -> Option<Vec<u8>> {
        self.table.lookup(handle)?.receive()
    }
}

#[cfg(feature = "quic")]
impl Transport<crate::quic::QuicDialer> {
    /// Create a transport backed by the production QUIC dialer.
    pub fn quic() -> Result<Self, crate::core::DialError> {
        Ok(Self::new(crate::quic::QuicDialer::new()?))
    }
}
