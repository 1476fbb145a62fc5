//! Deadline-based frame pacing.
//!
//! The pacer keeps an absolute `next_deadline` and moves it forward by
//! exactly one frame interval per cycle. A slow cycle therefore eats
//! into the following sleeps instead of shifting the whole schedule.
//! Only when the schedule falls more than `max_backlog` intervals
//! behind is it pulled forward to `now`, which bounds the burst of
//! catch-up sends after a long stall.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::CamError;

/// Frame rate assumed when neither the config nor the source gives one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Deadline scheduler yielding one go signal per frame interval.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_deadline: Instant,
    max_backlog: Option<u32>,
    resyncs: u64,
}

impl Pacer {
    /// Pacer with the first deadline at `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_deadline: start,
            max_backlog: None,
            resyncs: 0,
        }
    }

    /// Pacer for `fps` frames per second.
    pub fn from_fps(fps: f64, start: Instant) -> Result<Self, CamError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CamError::InvalidConfig(format!(
                "frame rate must be positive, got {fps}"
            )));
        }
        Ok(Self::new(Duration::from_secs_f64(1.0 / fps), start))
    }

    /// Resynchronise to `now` once the schedule lags by more than
    /// `frames` intervals.
    pub fn with_max_backlog(mut self, frames: u32) -> Self {
        self.max_backlog = Some(frames);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    /// How many times the backlog policy pulled the schedule forward.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Start a cycle at `now`.
    ///
    /// Returns how long to wait before the cycle's work may begin, and
    /// advances the deadline by one interval.
    pub fn advance(&mut self, now: Instant) -> Duration {
        if let Some(max) = self.max_backlog {
            let lag = now.saturating_duration_since(self.next_deadline);
            if lag > self.interval * max {
                tracing::debug!(?lag, "pacer backlog exceeded; resynchronising");
                self.next_deadline = now;
                self.resyncs += 1;
            }
        }

        let wait = self.next_deadline.saturating_duration_since(now);
        self.next_deadline += self.interval;
        wait
    }

    /// Sleep until the current deadline (if not already past it).
    pub async fn tick(&mut self) {
        let wait = self.advance(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn first_cycle_is_immediate() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(33 * MS, t0);
        assert_eq!(pacer.advance(t0), Duration::ZERO);
        assert_eq!(pacer.next_deadline(), t0 + 33 * MS);
    }

    #[test]
    fn waits_for_remaining_time_in_interval() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(33 * MS, t0);
        pacer.advance(t0);
        // 10ms of work, then the next cycle should sleep 23ms.
        assert_eq!(pacer.advance(t0 + 10 * MS), 23 * MS);
    }

    #[test]
    fn transient_overrun_does_not_shift_schedule() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(33 * MS, t0);
        pacer.advance(t0);
        let previous = pacer.next_deadline();

        // One cycle takes 100ms of work.
        let wait = pacer.advance(t0 + 100 * MS);
        assert_eq!(wait, Duration::ZERO);
        assert_eq!(pacer.next_deadline(), previous + 33 * MS);
        assert_eq!(pacer.next_deadline(), t0 + 66 * MS);

        // Catch-up cycles run back to back until the schedule is ahead again.
        assert_eq!(pacer.advance(t0 + 101 * MS), Duration::ZERO);
        assert_eq!(pacer.advance(t0 + 102 * MS), Duration::ZERO);
        assert_eq!(pacer.advance(t0 + 103 * MS), 29 * MS);
        assert_eq!(pacer.resyncs(), 0);
    }

    #[test]
    fn backlog_policy_resyncs_to_now() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(10 * MS, t0).with_max_backlog(3);
        pacer.advance(t0);

        // 25ms late: within 3 intervals, schedule kept.
        pacer.advance(t0 + 35 * MS);
        assert_eq!(pacer.next_deadline(), t0 + 20 * MS);
        assert_eq!(pacer.resyncs(), 0);

        // 480ms late: pulled forward.
        let now = t0 + 500 * MS;
        assert_eq!(pacer.advance(now), Duration::ZERO);
        assert_eq!(pacer.next_deadline(), now + 10 * MS);
        assert_eq!(pacer.resyncs(), 1);
    }

    #[test]
    fn rejects_non_positive_fps() {
        let t0 = Instant::now();
        assert!(Pacer::from_fps(0.0, t0).is_err());
        assert!(Pacer::from_fps(f64::NAN, t0).is_err());
        let pacer = Pacer::from_fps(50.0, t0).unwrap();
        assert_eq!(pacer.interval(), 20 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_sleeps_on_schedule() {
        let start = Instant::now();
        let mut pacer = Pacer::new(33 * MS, start);
        for _ in 0..4 {
            pacer.tick().await;
        }
        // First tick is immediate, three more intervals follow.
        let elapsed = start.elapsed();
        assert!(elapsed >= 99 * MS && elapsed < 103 * MS, "elapsed = {elapsed:?}");
    }
}
