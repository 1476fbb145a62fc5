//! Frame-rate measurement and transport counters.
//!
//! [`FpsMeter`] counts frames over one-second windows and keeps an
//! exponential moving average across windows, so both the sender and
//! the receiver can log a steady rate without per-frame noise.

use std::time::Duration;

use tokio::time::Instant;

use crate::reassembly::TableStats;

/// Default EMA smoothing factor.
pub const DEFAULT_FPS_ALPHA: f64 = 0.2;

// ── FpsMeter ─────────────────────────────────────────────────────

/// Rate for one completed measurement window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsReport {
    /// Rate over the window that just closed.
    pub instant: f64,
    /// Smoothed rate including this window.
    pub ema: f64,
}

/// Windowed frames-per-second meter with EMA smoothing.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    frames: u64,
    window_start: Instant,
    window: Duration,
    alpha: f64,
    ema: Option<f64>,
}

impl FpsMeter {
    /// One-second windows, α = 0.2.
    pub fn new(now: Instant) -> Self {
        Self::with_window(now, Duration::from_secs(1), DEFAULT_FPS_ALPHA)
    }

    pub fn with_window(now: Instant, window: Duration, alpha: f64) -> Self {
        Self {
            frames: 0,
            window_start: now,
            window,
            alpha: alpha.clamp(0.0, 1.0),
            ema: None,
        }
    }

    /// Count one frame at `now`. Returns a report when the current
    /// window has run its full length.
    pub fn record(&mut self, now: Instant) -> Option<FpsReport> {
        self.frames += 1;
        self.poll(now)
    }

    /// Close the window if it has elapsed, without counting a frame.
    pub fn poll(&mut self, now: Instant) -> Option<FpsReport> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        let instant = self.frames as f64 / elapsed.as_secs_f64();
        let ema = match self.ema {
            None => instant,
            Some(prev) => self.alpha * instant + (1.0 - self.alpha) * prev,
        };
        self.ema = Some(ema);
        self.frames = 0;
        self.window_start = now;
        Some(FpsReport { instant, ema })
    }

    /// Smoothed rate, once at least one window has closed.
    pub fn ema(&self) -> Option<f64> {
        self.ema
    }
}

// ── Counters ─────────────────────────────────────────────────────

/// Receiver-side counters, published by the ingest loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceiverStats {
    pub datagrams: u64,
    pub bytes: u64,
    /// Header failed to decode.
    pub malformed: u64,
    /// Payload type did not match the configured stream.
    pub filtered: u64,
    pub receive_errors: u64,
    pub table: TableStats,
    /// Frames handed to the sink.
    pub delivered: u64,
    pub fps: Option<f64>,
}

/// Sender-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SenderStats {
    pub frames: u64,
    pub datagrams: u64,
    pub bytes: u64,
    /// Frames the source failed to produce.
    pub skipped: u64,
    pub send_errors: u64,
    pub pacer_resyncs: u64,
    pub fps: Option<f64>,
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn no_report_before_window_closes() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(t0);
        for i in 0..10u32 {
            assert!(meter.record(t0 + i * 50 * MS).is_none());
        }
        assert_eq!(meter.ema(), None);
    }

    #[test]
    fn first_window_seeds_ema() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(t0);
        for i in 1..30u32 {
            meter.record(t0 + i * 30 * MS);
        }
        let report = meter.record(t0 + 1000 * MS).unwrap();
        assert!((report.instant - 30.0).abs() < 1e-9);
        assert_eq!(report.ema, report.instant);
    }

    #[test]
    fn ema_smooths_across_windows() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(t0);
        for i in 1..=10u32 {
            meter.record(t0 + i * 100 * MS);
        }
        assert_eq!(meter.ema(), Some(10.0));

        let t1 = t0 + 1000 * MS;
        for i in 1..=20u32 {
            meter.record(t1 + i * 50 * MS);
        }
        // 0.2 * 20 + 0.8 * 10 = 12
        let ema = meter.ema().unwrap();
        assert!((ema - 12.0).abs() < 1e-9, "ema = {ema}");
    }

    #[test]
    fn poll_reports_zero_rate_when_idle() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::new(t0);
        let report = meter.poll(t0 + 2000 * MS).unwrap();
        assert_eq!(report.instant, 0.0);
    }
}
