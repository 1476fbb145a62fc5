//! Sender-side streaming loop.
//!
//! Each cycle:
//!
//! 1. [`Pacer`] waits for the next frame deadline.
//! 2. The [`FrameSource`] yields one encoded frame.
//! 3. [`Fragmenter`] splits it into header-prefixed datagrams.
//! 4. [`FrameTransmitter`] writes them to the receiver.
//!
//! The loop runs until its `CancellationToken` fires or the source is
//! exhausted.

use rand_core::{OsRng, RngCore};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CamError;
use crate::fragment::{DEFAULT_PAYLOAD_SIZE, Fragmenter, TimedStreamParams};
use crate::header::HeaderKind;
use crate::pacer::{DEFAULT_FPS, Pacer};
use crate::source::FrameSource;
use crate::stats::{FpsMeter, SenderStats};
use crate::transport::FrameTransmitter;

/// Payload type stamped on timed headers by default.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

// ── SenderConfig ─────────────────────────────────────────────────

/// Configuration for [`StreamSender`].
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub header: HeaderKind,
    /// Payload bytes per datagram, header excluded.
    pub payload_size: usize,
    pub payload_type: u8,
    /// Explicit frame rate. `None` uses the source's rate, then 30.
    pub fps: Option<f64>,
    /// Resynchronise the schedule after this many intervals of lag.
    pub max_backlog_frames: Option<u32>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            header: HeaderKind::Timed,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            fps: None,
            max_backlog_frames: None,
        }
    }
}

// ── StreamSender ─────────────────────────────────────────────────

/// Paces frames from a source onto the network.
pub struct StreamSender<S> {
    source: S,
    fragmenter: Fragmenter,
    transmitter: FrameTransmitter,
    pacer: Pacer,
    fps: f64,
    meter: FpsMeter,
    stats: SenderStats,
    stats_tx: watch::Sender<SenderStats>,
}

impl<S: FrameSource> StreamSender<S> {
    pub fn new(
        source: S,
        transmitter: FrameTransmitter,
        config: SenderConfig,
    ) -> Result<Self, CamError> {
        let fps = config
            .fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .or_else(|| source.native_fps().filter(|f| f.is_finite() && *f > 0.0))
            .unwrap_or(DEFAULT_FPS);

        let fragmenter = match config.header {
            HeaderKind::Counted => Fragmenter::counted(config.payload_size, OsRng.next_u32())?,
            HeaderKind::Timed => Fragmenter::timed(
                config.payload_size,
                TimedStreamParams::random(config.payload_type, fps),
            )?,
        };

        let now = Instant::now();
        let mut pacer = Pacer::from_fps(fps, now)?;
        if let Some(max) = config.max_backlog_frames {
            pacer = pacer.with_max_backlog(max);
        }

        let (stats_tx, _) = watch::channel(SenderStats::default());
        Ok(Self {
            source,
            fragmenter,
            transmitter,
            pacer,
            fps,
            meter: FpsMeter::new(now),
            stats: SenderStats::default(),
            stats_tx,
        })
    }

    /// Effective frame rate.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Obtain a `watch::Receiver` for send statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<SenderStats> {
        self.stats_tx.subscribe()
    }

    pub fn transmitter(&self) -> &FrameTransmitter {
        &self.transmitter
    }

    /// Run the paced send loop until `shutdown` fires or the source
    /// runs dry.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SenderStats, CamError> {
        info!(
            fps = self.fps,
            header = ?self.fragmenter.kind(),
            payload = self.fragmenter.payload_size(),
            "streaming to {}",
            self.transmitter.remote_addr()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.pacer.tick() => {}
            }
            if !self.send_next().await {
                info!("source exhausted");
                break;
            }
        }

        info!(
            frames = self.stats.frames,
            datagrams = self.stats.datagrams,
            bytes = self.stats.bytes,
            "sender stopped"
        );
        Ok(self.stats)
    }

    /// One unpaced cycle. Returns `false` once the source is exhausted.
    pub async fn send_next(&mut self) -> bool {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return false,
            Err(e) => {
                warn!("skipping frame: {e}");
                self.stats.skipped += 1;
                self.publish();
                return true;
            }
        };

        let datagrams = match self.fragmenter.fragment(&frame) {
            Ok(d) if d.is_empty() => {
                debug!("source produced an empty frame");
                self.stats.skipped += 1;
                self.publish();
                return true;
            }
            Ok(d) => d,
            Err(e) => {
                warn!(len = frame.len(), "skipping frame: {e}");
                self.stats.skipped += 1;
                self.publish();
                return true;
            }
        };

        let report = self.transmitter.send_datagrams(&datagrams).await;
        self.stats.frames += 1;
        self.stats.datagrams += report.datagrams as u64;
        self.stats.bytes += report.bytes as u64;
        self.stats.send_errors += report.failed as u64;

        if let Some(fps) = self.meter.record(Instant::now()) {
            info!(
                "sending {:.1} fps (avg {:.1}), {} frames",
                fps.instant, fps.ema, self.stats.frames
            );
            self.stats.fps = Some(fps.ema);
        }
        self.publish();
        true
    }

    fn publish(&mut self) {
        self.stats.pacer_resyncs = self.pacer.resyncs();
        self.stats_tx.send_replace(self.stats);
    }
}

// ── Tests ────────────────────────────────────────────────────────
