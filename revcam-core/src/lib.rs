//! # revcam-core
//!
//! Low-latency UDP transport for encoded camera frames.
//!
//! This crate contains:
//! - **Header**: `CountedHeader` and `TimedHeader`, the two fragment header shapes
//! - **Fragment**: `Fragmenter` splitting frames into MTU-sized datagrams
//! - **Pacer**: deadline-based frame scheduling
//! - **Reassembly**: `ReassemblyTable` rebuilding frames from lossy, reordered fragments
//! - **Ingest**: `FrameReceiver` and the socket-driven `IngestLoop`
//! - **Cell**: `LatestFrameCell` publishing the newest frame to readers
//! - **Sender**: `StreamSender`, the paced source-to-socket loop
//! - **Error**: `CamError`, typed `thiserror`-based errors

pub mod cell;
pub mod error;
pub mod fragment;
pub mod header;
pub mod ingest;
pub mod pacer;
pub mod reassembly;
pub mod sender;
pub mod sink;
pub mod source;
pub mod stats;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use cell::{FrameSnapshot, LatestFrameCell, LatestFrameReader, Signal};
pub use error::CamError;
pub use fragment::{DEFAULT_PAYLOAD_SIZE, Fragmenter, MEDIA_CLOCK_HZ, TimedStreamParams};
pub use header::{CountedHeader, FragmentHeader, HeaderKind, TimedHeader};
pub use ingest::{FrameReceiver, IngestConfig, IngestLoop};
pub use pacer::{DEFAULT_FPS, Pacer};
pub use reassembly::{
    CompletedFrame, DeliveryReason, FragmentOutcome, ReassemblyConfig, ReassemblyTable,
    StreamKey, TableStats,
};
pub use sender::{DEFAULT_PAYLOAD_TYPE, SenderConfig, StreamSender};
pub use sink::{ChannelSink, FrameSink};
pub use source::{FrameSource, MemorySource};
pub use stats::{FpsMeter, ReceiverStats, SenderStats};
pub use transport::{DEFAULT_SOCKET_BUFFER, FrameTransmitter};

// Re-exported so binaries share one cancellation type.
pub use tokio_util::sync::CancellationToken;
