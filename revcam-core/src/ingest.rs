//! Receiver-side ingest.
//!
//! [`FrameReceiver`] is the socket-free core: it decodes datagrams,
//! drives the [`ReassemblyTable`], hands completed frames to a
//! [`FrameSink`] and tracks signal loss. [`IngestLoop`] feeds it from a
//! UDP socket with a short receive timeout, so overdue frames are
//! swept even when the network goes quiet.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::CamError;
use crate::header::{FragmentHeader, HeaderKind};
use crate::reassembly::{CompletedFrame, FragmentOutcome, ReassemblyConfig, ReassemblyTable};
use crate::sink::FrameSink;
use crate::stats::{FpsMeter, ReceiverStats};
use crate::transport::{bind_udp, is_terminal_receive_error, set_recv_buffer};

/// Largest datagram the ingest loop will read.
pub const MAX_DATAGRAM: usize = 65_535;

// ── IngestConfig ─────────────────────────────────────────────────

/// Configuration for [`FrameReceiver`] and [`IngestLoop`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub header: HeaderKind,
    /// Accept only this payload type on timed streams. `None` accepts any.
    pub payload_type: Option<u8>,
    pub reassembly: ReassemblyConfig,
    /// Receive timeout; bounds how late a sweep can run.
    pub poll_interval: Duration,
    /// No delivery for this long counts as signal loss.
    pub stale_after: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            header: HeaderKind::Timed,
            payload_type: Some(crate::sender::DEFAULT_PAYLOAD_TYPE),
            reassembly: ReassemblyConfig::default(),
            poll_interval: Duration::from_millis(20),
            stale_after: Duration::from_secs(1),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), CamError> {
        self.reassembly.validate()?;
        if self.poll_interval.is_zero() {
            return Err(CamError::InvalidConfig("poll interval must be non-zero".into()));
        }
        if self.stale_after.is_zero() {
            return Err(CamError::InvalidConfig("stale period must be non-zero".into()));
        }
        Ok(())
    }
}

// ── FrameReceiver ────────────────────────────────────────────────

/// Datagram-in, frame-out receive pipeline.
pub struct FrameReceiver<S> {
    config: IngestConfig,
    table: ReassemblyTable,
    sink: S,
    stats: ReceiverStats,
    meter: FpsMeter,
    completed: Vec<CompletedFrame>,
    /// Start of the current quiet period.
    quiet_since: Instant,
    last_frame_at: Option<Instant>,
    signal_lost: bool,
}

impl<S: FrameSink> FrameReceiver<S> {
    pub fn new(config: IngestConfig, sink: S, now: Instant) -> Result<Self, CamError> {
        config.validate()?;
        let table = ReassemblyTable::new(config.header, config.reassembly)?;
        Ok(Self {
            config,
            table,
            sink,
            stats: ReceiverStats::default(),
            meter: FpsMeter::new(now),
            completed: Vec::new(),
            quiet_since: now,
            last_frame_at: None,
            signal_lost: false,
        })
    }

    /// Process one datagram from `peer`.
    ///
    /// Returns `None` if it was dropped before reaching the table
    /// (undecodable header or foreign payload type).
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        peer: SocketAddr,
        now: Instant,
    ) -> Option<FragmentOutcome> {
        self.stats.datagrams += 1;
        self.stats.bytes += datagram.len() as u64;

        let (header, payload) = match FragmentHeader::split(self.config.header, datagram) {
            Ok(parts) => parts,
            Err(e) => {
                self.stats.malformed += 1;
                trace!(%peer, len = datagram.len(), "dropping datagram: {e}");
                return None;
            }
        };

        if let (FragmentHeader::Timed(h), Some(wanted)) = (&header, self.config.payload_type)
            && h.payload_type != wanted
        {
            self.stats.filtered += 1;
            trace!(%peer, pt = h.payload_type, "dropping foreign payload type");
            return None;
        }

        let outcome = self.table.ingest(
            peer,
            &header,
            Bytes::copy_from_slice(payload),
            now,
            &mut self.completed,
        );
        self.deliver_completed();
        Some(outcome)
    }

    /// Periodic housekeeping: sweep overdue frames and check for
    /// signal loss.
    pub fn tick(&mut self, now: Instant) {
        self.table.sweep(now, &mut self.completed);
        self.deliver_completed();

        let quiet = now.saturating_duration_since(self.quiet_since);
        if !self.signal_lost && quiet > self.config.stale_after {
            self.signal_lost = true;
            warn!("no signal for {quiet:?}");
            self.sink.on_signal_lost(self.last_frame_at);
        }

        if let Some(fps) = self.meter.poll(now) {
            self.stats.fps = Some(fps.ema);
        }
    }

    /// Record a transient socket error.
    pub fn note_receive_error(&mut self) {
        self.stats.receive_errors += 1;
    }

    pub fn stats(&self) -> ReceiverStats {
        ReceiverStats {
            table: self.table.stats(),
            ..self.stats
        }
    }

    pub fn table(&self) -> &ReassemblyTable {
        &self.table
    }

    pub fn is_signal_lost(&self) -> bool {
        self.signal_lost
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn deliver_completed(&mut self) {
        for frame in self.completed.drain(..) {
            if self.signal_lost {
                self.signal_lost = false;
                info!(peer = %frame.key.peer, "signal restored");
            }
            debug!(
                peer = %frame.key.peer,
                tag = frame.frame_tag,
                len = frame.bytes.len(),
                missing = frame.missing,
                reason = ?frame.reason,
                "frame complete"
            );
            self.quiet_since = frame.completed_at;
            self.last_frame_at = Some(frame.completed_at);
            self.stats.delivered += 1;
            if let Some(fps) = self.meter.record(frame.completed_at) {
                info!(
                    "receiving {:.1} fps (avg {:.1}), {} frames",
                    fps.instant, fps.ema, self.stats.delivered
                );
                self.stats.fps = Some(fps.ema);
            }
            self.sink.on_frame_complete(frame);
        }
    }
}

// ── IngestLoop ───────────────────────────────────────────────────

/// Socket-driven wrapper around [`FrameReceiver`].
pub struct IngestLoop<S> {
    socket: UdpSocket,
    receiver: FrameReceiver<S>,
    poll_interval: Duration,
    buf: Vec<u8>,
    stats_tx: watch::Sender<ReceiverStats>,
}

impl<S: FrameSink> IngestLoop<S> {
    /// Wrap an already-bound socket.
    pub fn new(socket: UdpSocket, config: IngestConfig, sink: S) -> Result<Self, CamError> {
        let poll_interval = config.poll_interval;
        let receiver = FrameReceiver::new(config, sink, Instant::now())?;
        let (stats_tx, _) = watch::channel(ReceiverStats::default());
        Ok(Self {
            socket,
            receiver,
            poll_interval,
            buf: vec![0u8; MAX_DATAGRAM],
            stats_tx,
        })
    }

    /// Bind `addr` with a `recv_buffer` byte kernel buffer.
    pub async fn bind(
        addr: SocketAddr,
        recv_buffer: usize,
        config: IngestConfig,
        sink: S,
    ) -> Result<Self, CamError> {
        let socket = bind_udp(addr).await?;
        if let Err(e) = set_recv_buffer(&socket, recv_buffer) {
            warn!("could not size receive buffer: {e}");
        }
        Self::new(socket, config, sink)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CamError> {
        Ok(self.socket.local_addr()?)
    }

    /// Obtain a `watch::Receiver` for receive statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<ReceiverStats> {
        self.stats_tx.subscribe()
    }

    /// Receive until `shutdown` fires.
    ///
    /// Transient socket errors are counted and the loop carries on; a
    /// terminal one ends the loop with [`CamError::Transport`].
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ReceiverStats, CamError> {
        info!("listening on {}", self.local_addr()?);

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = tokio::time::timeout(self.poll_interval, self.socket.recv_from(&mut self.buf)) => r,
            };

            let now = Instant::now();
            match received {
                Ok(Ok((len, peer))) => {
                    self.receiver.handle_datagram(&self.buf[..len], peer, now);
                }
                Ok(Err(e)) if is_terminal_receive_error(&e) => {
                    error!("receive failed: {e}");
                    return Err(CamError::Transport(e));
                }
                Ok(Err(e)) => {
                    debug!("transient receive error: {e}");
                    self.receiver.note_receive_error();
                }
                Err(_) => {}
            }

            self.receiver.tick(now);
            self.stats_tx.send_replace(self.receiver.stats());
        }

        let stats = self.receiver.stats();
        info!(
            datagrams = stats.datagrams,
            delivered = stats.delivered,
            abandoned = stats.table.abandoned,
            "ingest stopped"
        );
        Ok(stats)
    }
}

// ── Tests ────────────────────────────────────────────────────────
