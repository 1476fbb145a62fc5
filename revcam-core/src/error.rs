//! Domain-specific error types for the revcam transport.
//!
//! All fallible operations return `Result<T, CamError>`.
//! Malformed datagrams surface as typed errors so the ingest loop can
//! drop them without ever panicking.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// The canonical error type for the revcam transport.
#[derive(Debug, Error)]
pub enum CamError {
    // ── Header Errors ────────────────────────────────────────────
    /// The datagram is shorter than the fixed header.
    #[error("header too short: expected {expected} bytes, got {actual}")]
    HeaderTooShort { expected: usize, actual: usize },

    /// The timed header carried a version other than the one we speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// A header field is out of range for the variant being encoded.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    // ── Fragment Errors ──────────────────────────────────────────
    /// The frame needs more fragments than the header can count.
    #[error("frame too large: {fragments} fragments (max {max})")]
    FrameTooLarge { fragments: usize, max: usize },

    /// A payload size of zero cannot make progress.
    #[error("payload size must be non-zero")]
    ZeroPayloadSize,

    // ── Configuration Errors ─────────────────────────────────────
    /// The jitter window must be strictly shorter than the frame timeout.
    #[error("jitter window {jitter:?} must be shorter than frame timeout {timeout:?}")]
    WindowOrdering { jitter: Duration, timeout: Duration },

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// Binding the datagram socket failed at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Source Errors ────────────────────────────────────────────
    /// The frame source could not produce an encoded frame.
    #[error("frame source error: {0}")]
    Source(String),
}
