//! The seam between the connection core and the underlying secure transport.
//!
//! A [`Dialer`] performs one candidate handshake (including trust validation
//! against the pinned certificate fingerprints) and yields a [`Session`]: an
//! established, already-encrypted transport exposing an unreliable datagram
//! channel and, optionally, one ordered reliable byte stream.
//!
//! The production implementation rides QUIC (see the `quic` module); tests
//! drive the connection core through in-memory sessions.

use async_trait::async_trait;

use crate::core::{DialError, SessionError, TransportConfig};

/// One established secure transport session.
///
/// Contract: [`Session::close`] must unblock any read currently parked in
/// [`Session::recv_datagram`] or [`Session::recv_stream`] with an error or
/// end-of-stream, so cooperative teardown never waits on a stuck read.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Largest datagram payload the session accepts, fixed at handshake.
    fn max_datagram_size(&self) -> usize;

    /// Whether the session carries a reliable stream channel.
    fn supports_stream(&self) -> bool;

    /// Send one datagram. An empty payload is a valid keepalive.
    async fn send_datagram(&self, payload: &[u8]) -> Result<(), SessionError>;

    /// Receive one datagram into `buf`, returning its length.
    ///
    /// `Ok(0)` is an empty datagram (peer keepalive), not end-of-session;
    /// session closure surfaces as `Err`.
    async fn recv_datagram(&self, buf: &mut [u8]) -> Result<usize, SessionError>;

    /// Write raw bytes to the reliable stream.
    async fn send_stream(&self, bytes: &[u8]) -> Result<(), SessionError>;

    /// Read a chunk from the reliable stream into `buf`.
    ///
    /// Returns `Ok(0)` on a clean end-of-stream.
    async fn recv_stream(&self, buf: &mut [u8]) -> Result<usize, SessionError>;

    /// Close the session, releasing transport resources and unblocking
    /// pending reads.
    async fn close(&self);
}

/// Opens sessions against candidate endpoints.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Session type produced by this dialer.
    type Session: Session;

    /// Attempt a handshake with one candidate endpoint.
    ///
    /// A failure is local to this candidate; the caller advances to the next
    /// URL in the list. Implementations must abort cleanly on error and on
    /// drop, leaving nothing half-open behind.
    async fn dial(
        &self,
        url: &str,
        config: &TransportConfig,
    ) -> Result<Self::Session, DialError>;
}
