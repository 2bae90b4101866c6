//! Transport constants.

use std::time::Duration;

/// Send an empty keepalive datagram if no send happened for this long.
///
/// The check runs on a timer of the same period, so an idle connection
/// emits at most one keepalive per elapsed interval.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of one pooled I/O buffer.
///
/// Generous upper bound for a datagram or a stream read chunk; QUIC
/// datagrams top out well below this.
pub const POOL_BUFFER_CAPACITY: usize = 2048;

/// Length prefix size of a reliable-stream frame (u16, little-endian).
pub const FRAME_PREFIX_SIZE: usize = 2;

/// Largest payload the reliable-stream framing can carry.
pub const MAX_RELIABLE_PAYLOAD: usize = u16::MAX as usize;

/// SHA-256 certificate fingerprint size.
pub const CERT_HASH_SIZE: usize = 32;

/// Upper bound on the UTF-8 result payload of an authorization flow.
pub const MAX_AUTH_RESULT_SIZE: usize = 4096;
