//! # Tether
//!
//! Client-side multiplexed secure transport. Tether lets an application open
//! logical connections to one of several candidate server endpoints and
//! exchange both unreliable (datagram) and reliable (ordered, framed)
//! messages over an already-encrypted transport, tolerating partial failures
//! without ever crashing the caller. It provides:
//!
//! - **Endpoint fallback**: candidate URLs tried in order, first successful
//!   handshake wins, certificate trust pinned by SHA-256 fingerprint
//! - **Two channel kinds**: datagrams as-is, reliable messages framed with a
//!   16-bit length prefix over one ordered stream
//! - **Pooled I/O**: the send/receive hot path borrows recycled buffers
//!   instead of allocating per message
//! - **Cooperative teardown**: read loops, keepalive, and the session are
//!   supervised together and cancelled as a unit
//!
//! ## Feature Flags
//!
//! - `quic` (default): production dialer over quinn/rustls
//!
//! ## Example
//!
//! ```no_run
//! use tether::{Transport, TransportState};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::quic()?;
//! let handle = transport.connect_json(
//!     r#"{
//!         "urls": ["https://game.example:4433"],
//!         "serverCertificateHashes": ["pD3b8Xauu0VcuMyz1whoHY1TjSSkR4Dr1WkU6vCkZS0="]
//!     }"#,
//! )?;
//!
//! loop {
//!     match transport.state(handle) {
//!         TransportState::Connecting => tokio::task::yield_now().await,
//!         TransportState::Connected => break,
//!         TransportState::Closed => return Err("all endpoints failed".into()),
//!     }
//! }
//!
//! transport.send(handle, b"hello", true);
//! while let Some(message) = transport.receive(handle) {
//!     println!("got {} bytes", message.len());
//! }
//! transport.disconnect(handle);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
mod client;
mod codec;
mod connection;
pub mod core;
mod pool;
mod session;
mod table;

// QUIC dialer (feature-gated)
#[cfg(feature = "quic")]
#[cfg_attr(docsrs, doc(cfg(feature = "quic")))]
pub mod quic;

pub use client::Transport;
pub use codec::{StreamDecoder, encode_frame, encode_frame_into};
pub use connection::{Connection, TransportState};
pub use crate::core::{
    CertificateHash, ConfigError, CongestionHint, DialError, FrameError, SessionError,
    TransportConfig,
};
pub use pool::{BufferPool, PooledBuf};
pub use session::{Dialer, Session};
pub use table::Handle;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::auth::{AuthLatch, AuthOpener, AuthState};
    pub use crate::client::Transport;
    pub use crate::connection::TransportState;
    pub use crate::core::{CertificateHash, CongestionHint, TransportConfig};
    pub use crate::session::{Dialer, Session};
    pub use crate::table::Handle;
}
