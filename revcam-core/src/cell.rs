//! Latest-frame cell shared between the ingest loop and readers.
//!
//! The ingest loop owns the [`LatestFrameCell`] and replaces its
//! content wholesale with each completed frame. Readers hold cloned
//! [`LatestFrameReader`]s and get an immutable [`FrameSnapshot`]; the
//! bytes are reference-counted, so a snapshot is cheap to take and can
//! never be observed half-written.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CamError;
use crate::reassembly::{CompletedFrame, StreamKey};

// ── FrameSnapshot ────────────────────────────────────────────────

/// One published frame.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub bytes: Bytes,
    pub completed_at: Instant,
    pub key: StreamKey,
    pub frame_tag: u32,
    /// Publication counter, starting at 1.
    pub sequence: u64,
}

impl FrameSnapshot {
    /// Time since the frame was completed.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.completed_at)
    }
}

/// What a reader should show.
#[derive(Debug, Clone)]
pub enum Signal {
    Live(FrameSnapshot),
    NoSignal,
}

// ── LatestFrameCell ──────────────────────────────────────────────

/// Writer side of the cell.
#[derive(Debug)]
pub struct LatestFrameCell {
    tx: watch::Sender<Option<FrameSnapshot>>,
    published: u64,
}

impl LatestFrameCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx, published: 0 }
    }

    /// A new read handle.
    pub fn reader(&self) -> LatestFrameReader {
        LatestFrameReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Replace the content with `frame`.
    pub fn publish(&mut self, frame: &CompletedFrame) {
        self.published += 1;
        self.tx.send_replace(Some(FrameSnapshot {
            bytes: frame.bytes.clone(),
            completed_at: frame.completed_at,
            key: frame.key,
            frame_tag: frame.frame_tag,
            sequence: self.published,
        }));
    }

    /// Drop the current frame so readers see no signal.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl Default for LatestFrameCell {
    fn default() -> Self {
        Self::new()
    }
}

// ── LatestFrameReader ────────────────────────────────────────────

/// Read side of the cell. Clone freely.
#[derive(Debug, Clone)]
pub struct LatestFrameReader {
    rx: watch::Receiver<Option<FrameSnapshot>>,
}

impl LatestFrameReader {
    /// The current frame, if any.
    pub fn latest(&self) -> Option<FrameSnapshot> {
        self.rx.borrow().clone()
    }

    /// The current frame, or [`Signal::NoSignal`] if there is none or
    /// it is older than `stale_after`.
    pub fn signal(&self, now: Instant, stale_after: Duration) -> Signal {
        match self.latest() {
            Some(snapshot) if snapshot.age(now) <= stale_after => Signal::Live(snapshot),
            _ => Signal::NoSignal,
        }
    }

    /// Whether the cell changed since this reader last looked.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next change and return the new content.
    ///
    /// Fails with [`CamError::ChannelClosed`] once the writer is gone.
    pub async fn changed(&mut self) -> Result<Option<FrameSnapshot>, CamError> {
        self.rx
            .changed()
            .await
            .map_err(|_| CamError::ChannelClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────
