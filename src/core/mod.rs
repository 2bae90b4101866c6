//! Shared foundation: configuration, constants, and error types.

mod config;
mod constants;
mod error;

pub use config::{CertificateHash, CongestionHint, TransportConfig};
pub use constants::{
    CERT_HASH_SIZE, FRAME_PREFIX_SIZE, KEEPALIVE_INTERVAL, MAX_AUTH_RESULT_SIZE,
    MAX_RELIABLE_PAYLOAD, POOL_BUFFER_CAPACITY,
};
pub use error::{ConfigError, DialError, FrameError, SessionError};
