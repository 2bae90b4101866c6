//! Production dialer over QUIC.
//!
//! [`QuicDialer`] implements the [`crate::Dialer`] seam with quinn and
//! rustls: TLS 1.3, ALPN `tether`, and server trust decided purely by
//! pinned SHA-256 certificate fingerprints (the self-signed trust model,
//! no web PKI involved). Each session carries datagrams natively and opens
//! one bidirectional stream as its reliable channel.

mod dialer;
mod verifier;

pub use dialer::{QuicDialer, QuicSession};
pub use verifier::PinnedCertVerifier;

/// ALPN protocol identifier negotiated by tether endpoints.
pub const ALPN_TETHER: &[u8] = b"tether";
