//! Periodic view of the latest frame.
//!
//! The reporter samples the [`LatestFrameReader`] on a fixed period,
//! logs what it sees, and optionally mirrors each new frame to a file.
//! Snapshot files are replaced atomically, so an external viewer never
//! reads a partially written JPEG.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use revcam_core::{CancellationToken, LatestFrameReader, ReceiverStats, Signal};

/// What one reporting pass saw.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Frame {
        sequence: u64,
        len: usize,
        age: Duration,
        /// A snapshot file was written on this pass.
        written: bool,
    },
    NoSignal,
}

/// Samples the latest frame on a timer.
pub struct Reporter {
    reader: LatestFrameReader,
    interval: Duration,
    stale_after: Duration,
    snapshot_path: Option<PathBuf>,
    stats: Option<watch::Receiver<ReceiverStats>>,
    last_written: u64,
}

impl Reporter {
    pub fn new(reader: LatestFrameReader, interval: Duration, stale_after: Duration) -> Self {
        Self {
            reader,
            interval,
            stale_after,
            snapshot_path: None,
            stats: None,
            last_written: 0,
        }
    }

    /// Mirror each new frame to `path`.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Include ingest counters in the log line.
    pub fn with_stats(mut self, stats: watch::Receiver<ReceiverStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Report every interval until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.report(Instant::now()).await;
        }
        debug!("reporter stopped");
    }

    /// One reporting pass at `now`.
    pub async fn report(&mut self, now: Instant) -> Report {
        let snapshot = match self.reader.signal(now, self.stale_after) {
            Signal::Live(snapshot) => snapshot,
            Signal::NoSignal => {
                info!("no signal");
                return Report::NoSignal;
            }
        };

        let mut written = false;
        if snapshot.sequence != self.last_written
            && let Some(path) = &self.snapshot_path
        {
            match write_atomic(path, &snapshot.bytes).await {
                Ok(()) => {
                    self.last_written = snapshot.sequence;
                    written = true;
                }
                Err(e) => warn!("could not write snapshot {}: {e}", path.display()),
            }
        }

        let age = snapshot.age(now);
        match &self.stats {
            Some(stats) => {
                let stats = *stats.borrow();
                info!(
                    len = snapshot.bytes.len(),
                    ?age,
                    from = %snapshot.key.peer,
                    fps = stats.fps.unwrap_or(0.0),
                    delivered = stats.delivered,
                    flushed = stats.table.flushed,
                    abandoned = stats.table.abandoned,
                    "frame {}",
                    snapshot.sequence
                );
            }
            None => info!(len = snapshot.bytes.len(), ?age, "frame {}", snapshot.sequence),
        }

        Report::Frame {
            sequence: snapshot.sequence,
            len: snapshot.bytes.len(),
            age,
            written,
        }
    }
}

/// Replace `path` with `data` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e);
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
