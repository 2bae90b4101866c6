//! Error types for the tether transport.

use thiserror::Error;

/// Errors raised while parsing or validating a connection configuration.
///
/// Configuration problems are reported at `connect` time; nothing from an
/// invalid config ever reaches a live connection.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The candidate endpoint list is empty.
    #[error("no candidate endpoint urls")]
    MissingUrls,

    /// A candidate endpoint URL is empty or malformed.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    /// A server certificate hash is not valid base64 or has the wrong size.
    #[error("invalid server certificate hash: {0}")]
    InvalidCertificateHash(String),

    /// The configuration document is not valid JSON.
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by one candidate endpoint during connection establishment.
///
/// A `DialError` is local to a single candidate: the connection advances to
/// the next URL in the list and only goes Closed once every candidate failed.
#[derive(Debug, Error)]
pub enum DialError {
    /// The URL could not be parsed or lacks a host.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The endpoint address could not be resolved.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The handshake failed, including trust validation against the
    /// pinned certificate fingerprints.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// I/O error while dialing.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by an established session.
///
/// Every session error is fatal to its connection: a failed send or receive
/// tears the whole connection down, never retries.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying session is closed or errored.
    #[error("session closed")]
    Closed,

    /// Datagram channel error.
    #[error("datagram error: {0}")]
    Datagram(String),

    /// Reliable stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// The session has no reliable stream channel.
    #[error("reliable stream not supported")]
    StreamUnsupported,
}

/// Errors raised by the reliable-stream framing codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The payload does not fit the 16-bit length prefix.
    #[error("payload of {size} bytes exceeds the 16-bit frame length")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
    },

    /// The destination buffer is too small for the framed message.
    #[error("frame of {size} bytes does not fit destination buffer")]
    BufferTooSmall {
        /// Size of the framed message.
        size: usize,
    },
}
