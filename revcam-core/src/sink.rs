//! Destinations for reassembled frames.
//!
//! The ingest loop hands every delivered frame to a [`FrameSink`]. The
//! sink runs on the ingest task, so implementations must not block:
//! the cell swaps a snapshot, the channel sink uses `try_send` and
//! drops frames when its consumer falls behind.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cell::LatestFrameCell;
use crate::reassembly::CompletedFrame;

/// Receives completed frames and signal-loss notices.
pub trait FrameSink {
    /// Called at most once per frame, never with empty bytes.
    fn on_frame_complete(&mut self, frame: CompletedFrame);

    /// Called once when no frame has been delivered for the configured
    /// stale period. `last_frame_at` is `None` if nothing ever arrived.
    fn on_signal_lost(&mut self, _last_frame_at: Option<Instant>) {}
}

impl<F> FrameSink for F
where
    F: FnMut(CompletedFrame),
{
    fn on_frame_complete(&mut self, frame: CompletedFrame) {
        self(frame)
    }
}

impl FrameSink for LatestFrameCell {
    fn on_frame_complete(&mut self, frame: CompletedFrame) {
        self.publish(&frame);
    }

    fn on_signal_lost(&mut self, _last_frame_at: Option<Instant>) {
        self.clear();
    }
}

// ── ChannelSink ──────────────────────────────────────────────────

/// Forwards frames over a bounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<CompletedFrame>,
    dropped: u64,
}

impl ChannelSink {
    /// A sink and the receiver that consumes it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CompletedFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Frames dropped because the consumer was full or gone.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameSink for ChannelSink {
    fn on_frame_complete(&mut self, frame: CompletedFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped += 1;
                debug!(tag = frame.frame_tag, "frame consumer behind; dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped += 1;
                if self.dropped == 1 {
                    warn!("frame consumer closed");
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
