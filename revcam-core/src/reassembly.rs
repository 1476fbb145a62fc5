//! Per-stream frame reassembly under loss, reordering and duplication.
//!
//! The table maps a [`StreamKey`] to the frame currently being
//! assembled for it. Fragments are stored by position; the frame is
//! handed out as soon as it is complete, and the [`sweep`] pass, run
//! once per ingest iteration, deals with frames that never finish.
//!
//! ## Completion rules
//!
//! | Header  | Key                    | Complete when                        |
//! |---------|------------------------|--------------------------------------|
//! | Counted | `(peer, frame_id)`     | every index `0..total` was received  |
//! | Timed   | `(peer, source_id)`    | the marker fragment was received     |
//!
//! Timed sequence numbers run across frames, so a frame starts one past
//! the previous frame's marker. When that marker is unknown (first
//! frame of a stream, or the previous frame never saw its marker), the
//! frame starts at the lowest sequence held, and a marker with nothing
//! below it cannot prove the start was received.
//!
//! A timed frame whose marker arrived while earlier positions are still
//! missing is *pending*: it is delivered when the gap fills, or
//! best-effort (gaps skipped) once `jitter_window` passes without a new
//! fragment. A newer timestamp from the same source ends the current
//! frame: it is delivered if it had its marker, discarded otherwise.
//!
//! ## Eviction order
//!
//! 1. pending and idle longer than `jitter_window` → flushed
//! 2. pending and older than `frame_timeout` → flushed
//! 3. older than `frame_timeout` without a marker → abandoned
//!
//! [`sweep`]: ReassemblyTable::sweep

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::CamError;
use crate::header::{CountedHeader, FragmentHeader, HeaderKind, TimedHeader};

// ── Configuration ────────────────────────────────────────────────

/// Timing and size limits for the reassembly table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    /// Grace period for a pending frame's stragglers.
    pub jitter_window: Duration,
    /// Hard bound on an incomplete frame's lifetime.
    pub frame_timeout: Duration,
    /// Upper bound on fragments held for a single frame.
    pub max_fragments: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            jitter_window: Duration::from_millis(20),
            frame_timeout: Duration::from_millis(60),
            max_fragments: 4096,
        }
    }
}

impl ReassemblyConfig {
    /// Check the window ordering and limits.
    pub fn validate(&self) -> Result<(), CamError> {
        if self.jitter_window >= self.frame_timeout {
            return Err(CamError::WindowOrdering {
                jitter: self.jitter_window,
                timeout: self.frame_timeout,
            });
        }
        if self.max_fragments == 0 {
            return Err(CamError::InvalidConfig(
                "max_fragments must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ── Public types ─────────────────────────────────────────────────

/// Identifies the lineage a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub peer: SocketAddr,
    /// Frame id (counted) or source id (timed).
    pub id: u32,
}

/// Why a frame left the table with its bytes delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReason {
    /// Every expected fragment was present.
    Complete,
    /// Marker seen, gaps remained, jitter window ran out.
    JitterWindow,
    /// Marker seen, gaps remained, a newer frame started.
    Superseded,
}

/// A reassembled frame ready for a sink.
#[derive(Debug, Clone)]
pub struct CompletedFrame {
    pub key: StreamKey,
    /// Frame id (counted) or media timestamp (timed).
    pub frame_tag: u32,
    pub bytes: Bytes,
    pub fragments: usize,
    /// Positions known to be missing at delivery time.
    pub missing: usize,
    pub reason: DeliveryReason,
    pub first_seen_at: Instant,
    pub completed_at: Instant,
}

/// What happened to a single fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Stored in an in-flight frame (which may have completed).
    Stored,
    /// Position already held; the earlier copy was kept.
    Duplicate,
    /// Belongs to a frame that already left the table.
    Late,
    /// Header inconsistent with the table or the frame.
    Invalid,
}

/// Running counters for the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub completed: u64,
    pub flushed: u64,
    pub superseded: u64,
    pub abandoned: u64,
    /// Timed frames dropped because a newer one began before their marker.
    pub discarded: u64,
    pub duplicates: u64,
    pub late: u64,
    pub invalid: u64,
}

// ── FrameAssembly ────────────────────────────────────────────────

#[derive(Debug)]
struct FrameAssembly {
    tag: u32,
    /// Counted frames only.
    expected_total: Option<usize>,
    /// Timed frames: sequence that maps to position 0.
    base_sequence: u16,
    /// Position 0 is known to be the frame's first fragment.
    start_known: bool,
    marker_pos: Option<i32>,
    fragments: BTreeMap<i32, Bytes>,
    first_seen_at: Instant,
    last_update_at: Instant,
}

impl FrameAssembly {
    fn counted(header: &CountedHeader, now: Instant) -> Self {
        Self {
            tag: header.frame_id,
            expected_total: Some(usize::from(header.total_fragments)),
            base_sequence: 0,
            start_known: true,
            marker_pos: None,
            fragments: BTreeMap::new(),
            first_seen_at: now,
            last_update_at: now,
        }
    }

    /// `start` is the sequence following the previous frame's marker.
    fn timed(header: &TimedHeader, start: Option<u16>, now: Instant) -> Self {
        Self {
            tag: header.timestamp,
            expected_total: None,
            base_sequence: start.unwrap_or(header.sequence),
            start_known: start.is_some(),
            marker_pos: None,
            fragments: BTreeMap::new(),
            first_seen_at: now,
            last_update_at: now,
        }
    }

    /// Position of a timed fragment, unwrapped around the frame start.
    fn timed_position(&self, sequence: u16) -> i32 {
        i32::from(sequence.wrapping_sub(self.base_sequence) as i16)
    }

    /// Store `payload` at `pos`; `false` if the position was taken.
    fn insert(&mut self, pos: i32, payload: Bytes, now: Instant) -> bool {
        if self.fragments.contains_key(&pos) {
            return false;
        }
        self.fragments.insert(pos, payload);
        self.last_update_at = now;
        true
    }

    fn received(&self) -> usize {
        self.fragments.len()
    }

    /// Positions known to be absent.
    fn missing(&self) -> usize {
        if let Some(total) = self.expected_total {
            return total.saturating_sub(self.received());
        }
        let (Some(marker), Some(&lowest)) = (self.marker_pos, self.fragments.keys().next()) else {
            return 0;
        };
        let first = if self.start_known { lowest.min(0) } else { lowest };
        let span = (marker - first + 1) as usize;
        let present = self.fragments.range(first..=marker).count();
        span.saturating_sub(present)
    }

    fn is_complete(&self) -> bool {
        match self.expected_total {
            Some(total) => self.received() == total,
            None => match self.marker_pos {
                Some(marker) => {
                    let start_proven = self.start_known
                        || self.fragments.keys().next().is_some_and(|&lowest| lowest < marker);
                    start_proven && self.missing() == 0
                }
                None => false,
            },
        }
    }

    /// Sequence number of the marker fragment, if it arrived.
    fn marker_sequence(&self) -> Option<u16> {
        self.marker_pos
            .map(|pos| self.base_sequence.wrapping_add(pos as u16))
    }

    /// Marker received but gaps still open.
    fn is_pending(&self) -> bool {
        self.marker_pos.is_some() && !self.is_complete()
    }

    fn assemble(&self) -> Bytes {
        let len = self.fragments.values().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(len);
        for payload in self.fragments.values() {
            out.extend_from_slice(payload);
        }
        out.freeze()
    }
}

/// Record of a frame that already left the table.
#[derive(Debug, Clone, Copy)]
struct Finished {
    tag: u32,
    at: Instant,
    /// Sequence the next timed frame starts at, when its marker was seen.
    next_start: Option<u16>,
}

/// `a` is strictly later than `b` on the wrapping 32-bit media clock.
fn timestamp_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

// ── ReassemblyTable ──────────────────────────────────────────────

/// In-flight frames for every stream seen by one receiver.
#[derive(Debug)]
pub struct ReassemblyTable {
    kind: HeaderKind,
    config: ReassemblyConfig,
    entries: HashMap<StreamKey, FrameAssembly>,
    /// Keys whose last frame left the table within `frame_timeout`.
    finished: HashMap<StreamKey, Finished>,
    stats: TableStats,
}

impl ReassemblyTable {
    /// Table for streams using `kind` headers.
    pub fn new(kind: HeaderKind, config: ReassemblyConfig) -> Result<Self, CamError> {
        config.validate()?;
        Ok(Self {
            kind,
            config,
            entries: HashMap::new(),
            finished: HashMap::new(),
            stats: TableStats::default(),
        })
    }

    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }

    /// Number of frames in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a frame is in flight for `key`.
    pub fn contains(&self, key: &StreamKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Distinct fragments held for `key`'s in-flight frame.
    pub fn received_count(&self, key: &StreamKey) -> Option<usize> {
        self.entries.get(key).map(FrameAssembly::received)
    }

    /// Feed one fragment. Frames it completes (or supersedes) are
    /// pushed onto `out`.
    pub fn ingest(
        &mut self,
        peer: SocketAddr,
        header: &FragmentHeader,
        payload: Bytes,
        now: Instant,
        out: &mut Vec<CompletedFrame>,
    ) -> FragmentOutcome {
        let outcome = match (self.kind, header) {
            (HeaderKind::Counted, FragmentHeader::Counted(h)) => {
                self.ingest_counted(peer, h, payload, now, out)
            }
            (HeaderKind::Timed, FragmentHeader::Timed(h)) => {
                self.ingest_timed(peer, h, payload, now, out)
            }
            _ => FragmentOutcome::Invalid,
        };

        match outcome {
            FragmentOutcome::Duplicate => self.stats.duplicates += 1,
            FragmentOutcome::Late => self.stats.late += 1,
            FragmentOutcome::Invalid => self.stats.invalid += 1,
            FragmentOutcome::Stored => {}
        }
        outcome
    }

    fn ingest_counted(
        &mut self,
        peer: SocketAddr,
        header: &CountedHeader,
        payload: Bytes,
        now: Instant,
        out: &mut Vec<CompletedFrame>,
    ) -> FragmentOutcome {
        let total = usize::from(header.total_fragments);
        if total == 0
            || header.fragment_index >= header.total_fragments
            || total > self.config.max_fragments
        {
            return FragmentOutcome::Invalid;
        }

        let key = StreamKey {
            peer,
            id: header.frame_id,
        };
        if self.finished.contains_key(&key) {
            return FragmentOutcome::Late;
        }

        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| FrameAssembly::counted(header, now));
        if entry.expected_total != Some(total) {
            return FragmentOutcome::Invalid;
        }
        if !entry.insert(i32::from(header.fragment_index), payload, now) {
            return FragmentOutcome::Duplicate;
        }

        if entry.is_complete()
            && let Some(done) = self.entries.remove(&key)
        {
            self.deliver(key, done, DeliveryReason::Complete, now, out);
        }
        FragmentOutcome::Stored
    }

    fn ingest_timed(
        &mut self,
        peer: SocketAddr,
        header: &TimedHeader,
        payload: Bytes,
        now: Instant,
        out: &mut Vec<CompletedFrame>,
    ) -> FragmentOutcome {
        let key = StreamKey {
            peer,
            id: header.source_id,
        };

        if let Some(done) = self.finished.get(&key)
            && !timestamp_newer(header.timestamp, done.tag)
        {
            return FragmentOutcome::Late;
        }

        if let Some(current) = self.entries.get(&key) {
            if current.tag != header.timestamp {
                if !timestamp_newer(header.timestamp, current.tag) {
                    return FragmentOutcome::Late;
                }
                // A newer frame began before this one finished.
                if let Some(previous) = self.entries.remove(&key) {
                    self.supersede(key, previous, now, out);
                }
            }
        }

        let max_fragments = self.config.max_fragments;
        let start = self.finished.get(&key).and_then(|done| done.next_start);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| FrameAssembly::timed(header, start, now));

        let pos = entry.timed_position(header.sequence);
        if entry.fragments.contains_key(&pos) {
            return FragmentOutcome::Duplicate;
        }
        if entry.received() >= max_fragments {
            return FragmentOutcome::Invalid;
        }
        entry.insert(pos, payload, now);
        if header.marker {
            entry.marker_pos = Some(pos);
        }

        let ready = if entry.is_complete() {
            Some(DeliveryReason::Complete)
        } else if entry.is_pending() && self.config.jitter_window.is_zero() {
            Some(DeliveryReason::JitterWindow)
        } else {
            None
        };

        if let Some(reason) = ready
            && let Some(done) = self.entries.remove(&key)
        {
            self.deliver(key, done, reason, now, out);
        }
        FragmentOutcome::Stored
    }

    /// Evict overdue frames. Pending frames past the jitter window or the
    /// frame timeout are flushed onto `out`; frames past the timeout
    /// without a marker are dropped.
    ///
    /// Returns the number of frames abandoned.
    pub fn sweep(&mut self, now: Instant, out: &mut Vec<CompletedFrame>) -> usize {
        let jitter = self.config.jitter_window;
        let timeout = self.config.frame_timeout;

        let mut flush = Vec::new();
        let mut abandon = Vec::new();
        for (key, entry) in &self.entries {
            let idle = now.saturating_duration_since(entry.last_update_at);
            let age = now.saturating_duration_since(entry.first_seen_at);
            if entry.is_pending() && (idle > jitter || age > timeout) {
                flush.push(*key);
            } else if age > timeout {
                abandon.push(*key);
            }
        }

        for key in flush {
            if let Some(entry) = self.entries.remove(&key) {
                self.deliver(key, entry, DeliveryReason::JitterWindow, now, out);
            }
        }

        let abandoned = abandon.len();
        for key in abandon {
            if let Some(entry) = self.entries.remove(&key) {
                debug!(
                    peer = %key.peer,
                    id = key.id,
                    tag = entry.tag,
                    received = entry.received(),
                    "abandoning incomplete frame"
                );
                self.retire(key, entry.tag, None, now);
                self.stats.abandoned += 1;
            }
        }

        self.finished
            .retain(|_, done| now.saturating_duration_since(done.at) <= timeout);

        abandoned
    }

    // ── Internal ─────────────────────────────────────────────────

    /// End a timed frame because a newer timestamp arrived.
    fn supersede(
        &mut self,
        key: StreamKey,
        previous: FrameAssembly,
        now: Instant,
        out: &mut Vec<CompletedFrame>,
    ) {
        if previous.marker_pos.is_some() {
            self.deliver(key, previous, DeliveryReason::Superseded, now, out);
        } else {
            debug!(
                peer = %key.peer,
                source = key.id,
                tag = previous.tag,
                received = previous.received(),
                "discarding frame without marker"
            );
            self.retire(key, previous.tag, None, now);
            self.stats.discarded += 1;
        }
    }

    fn deliver(
        &mut self,
        key: StreamKey,
        assembly: FrameAssembly,
        reason: DeliveryReason,
        now: Instant,
        out: &mut Vec<CompletedFrame>,
    ) {
        let next_start = assembly.marker_sequence().map(|seq| seq.wrapping_add(1));
        self.retire(key, assembly.tag, next_start, now);

        let bytes = assembly.assemble();
        if bytes.is_empty() {
            trace!(peer = %key.peer, id = key.id, "dropping empty frame");
            self.stats.discarded += 1;
            return;
        }

        match reason {
            DeliveryReason::Complete => self.stats.completed += 1,
            DeliveryReason::JitterWindow => self.stats.flushed += 1,
            DeliveryReason::Superseded => self.stats.superseded += 1,
        }

        out.push(CompletedFrame {
            key,
            frame_tag: assembly.tag,
            fragments: assembly.received(),
            missing: assembly.missing(),
            reason,
            first_seen_at: assembly.first_seen_at,
            completed_at: now,
            bytes,
        });
    }

    fn retire(&mut self, key: StreamKey, tag: u32, next_start: Option<u16>, now: Instant) {
        self.finished.insert(key, Finished { tag, at: now, next_start });
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn peer() -> SocketAddr {
        "10.0.0.2:5004".parse().unwrap()
    }

    fn counted(frame_id: u32, total: u16, index: u16) -> FragmentHeader {
        FragmentHeader::Counted(CountedHeader {
            frame_id,
            total_fragments: total,
            fragment_index: index,
        })
    }

    fn timed(sequence: u16, timestamp: u32, marker: bool) -> FragmentHeader {
        FragmentHeader::Timed(TimedHeader {
            sequence,
            timestamp,
            source_id: 42,
            marker,
            payload_type: 96,
        })
    }

    fn table(kind: HeaderKind) -> ReassemblyTable {
        ReassemblyTable::new(kind, ReassemblyConfig::default()).unwrap()
    }

    fn feed(
        t: &mut ReassemblyTable,
        header: FragmentHeader,
        payload: &'static [u8],
        now: Instant,
        out: &mut Vec<CompletedFrame>,
    ) -> FragmentOutcome {
        t.ingest(peer(), &header, Bytes::from_static(payload), now, out)
    }

    #[test]
    fn config_requires_jitter_shorter_than_timeout() {
        let cfg = ReassemblyConfig {
            jitter_window: 60 * MS,
            frame_timeout: 60 * MS,
            ..Default::default()
        };
        assert!(matches!(
            ReassemblyTable::new(HeaderKind::Timed, cfg),
            Err(CamError::WindowOrdering { .. })
        ));
    }

    #[test]
    fn counted_completes_out_of_order() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, counted(1, 3, 2), b"ef", now, &mut out);
        feed(&mut t, counted(1, 3, 0), b"ab", now, &mut out);
        assert!(out.is_empty());
        feed(&mut t, counted(1, 3, 1), b"cd", now + MS, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"abcdef");
        assert_eq!(out[0].reason, DeliveryReason::Complete);
        assert_eq!(out[0].missing, 0);
        assert_eq!(out[0].completed_at, now + MS);
        assert!(t.is_empty());
    }

    #[test]
    fn duplicates_keep_first_copy() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let now = Instant::now();
        let key = StreamKey { peer: peer(), id: 5 };

        feed(&mut t, counted(5, 2, 0), b"first", now, &mut out);
        let outcome = feed(&mut t, counted(5, 2, 0), b"other", now, &mut out);
        assert_eq!(outcome, FragmentOutcome::Duplicate);
        assert_eq!(t.received_count(&key), Some(1));

        feed(&mut t, counted(5, 2, 1), b"!", now, &mut out);
        assert_eq!(&out[0].bytes[..], b"first!");
        assert_eq!(t.stats().duplicates, 1);
    }

    #[test]
    fn late_duplicate_after_delivery_is_not_redelivered() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, counted(9, 1, 0), b"solo", now, &mut out);
        assert_eq!(out.len(), 1);
        let outcome = feed(&mut t, counted(9, 1, 0), b"solo", now + MS, &mut out);
        assert_eq!(outcome, FragmentOutcome::Late);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn counted_rejects_inconsistent_headers() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let now = Instant::now();

        assert_eq!(feed(&mut t, counted(1, 0, 0), b"x", now, &mut out), FragmentOutcome::Invalid);
        assert_eq!(feed(&mut t, counted(1, 2, 2), b"x", now, &mut out), FragmentOutcome::Invalid);
        feed(&mut t, counted(1, 2, 0), b"x", now, &mut out);
        assert_eq!(feed(&mut t, counted(1, 3, 1), b"x", now, &mut out), FragmentOutcome::Invalid);
        // Wrong header shape for this table.
        assert_eq!(feed(&mut t, timed(0, 0, true), b"x", now, &mut out), FragmentOutcome::Invalid);
        assert_eq!(t.stats().invalid, 4);
    }

    #[test]
    fn timeout_evicts_incomplete_frame_without_delivery() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let t0 = Instant::now();
        let key = StreamKey { peer: peer(), id: 3 };

        feed(&mut t, counted(3, 3, 0), b"a", t0, &mut out);
        feed(&mut t, counted(3, 3, 2), b"c", t0, &mut out);

        assert_eq!(t.sweep(t0 + 59 * MS, &mut out), 0);
        assert!(t.contains(&key));

        assert_eq!(t.sweep(t0 + 61 * MS, &mut out), 1);
        assert!(out.is_empty());
        assert!(!t.contains(&key));
        assert_eq!(t.stats().abandoned, 1);
    }

    #[test]
    fn frame_id_wrap_starts_independent_assembly() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, counted(u32::MAX, 2, 0), b"old", now, &mut out);
        feed(&mut t, counted(0, 1, 0), b"new", now, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_tag, 0);
        assert_eq!(&out[0].bytes[..], b"new");
        assert!(t.contains(&StreamKey { peer: peer(), id: u32::MAX }));
    }

    #[test]
    fn timed_marker_completes_contiguous_frame() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(10, 900, false), b"he", now, &mut out);
        feed(&mut t, timed(11, 900, false), b"ll", now, &mut out);
        feed(&mut t, timed(12, 900, true), b"o", now, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"hello");
        assert_eq!(out[0].frame_tag, 900);
        assert_eq!(out[0].reason, DeliveryReason::Complete);
    }

    #[test]
    fn timed_sequence_wraparound_keeps_order() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(0xFFFE, 7, false), b"a", now, &mut out);
        feed(&mut t, timed(0x0000, 7, true), b"c", now, &mut out);
        assert!(out.is_empty(), "0xFFFF still outstanding");
        feed(&mut t, timed(0xFFFF, 7, false), b"b", now, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"abc");
        assert_eq!(out[0].reason, DeliveryReason::Complete);
    }

    #[test]
    fn jitter_window_flushes_frame_with_interior_gap() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, timed(0, 100, false), b"0", t0, &mut out);
        feed(&mut t, timed(1, 100, false), b"1", t0, &mut out);
        feed(&mut t, timed(3, 100, false), b"3", t0, &mut out);
        feed(&mut t, timed(4, 100, true), b"4", t0, &mut out);
        assert!(out.is_empty(), "held for stragglers");

        t.sweep(t0 + 10 * MS, &mut out);
        assert!(out.is_empty());

        t.sweep(t0 + 21 * MS, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"0134");
        assert_eq!(out[0].missing, 1);
        assert_eq!(out[0].reason, DeliveryReason::JitterWindow);
        assert!(t.is_empty());
        assert_eq!(t.stats().flushed, 1);
        assert_eq!(t.stats().abandoned, 0);
    }

    #[test]
    fn straggler_inside_jitter_window_completes_frame() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, timed(0, 100, false), b"a", t0, &mut out);
        feed(&mut t, timed(2, 100, true), b"c", t0, &mut out);
        feed(&mut t, timed(1, 100, false), b"b", t0 + 5 * MS, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"abc");
        assert_eq!(out[0].reason, DeliveryReason::Complete);
    }

    #[test]
    fn zero_jitter_window_delivers_gapped_frame_immediately() {
        let cfg = ReassemblyConfig {
            jitter_window: Duration::ZERO,
            ..Default::default()
        };
        let mut t = ReassemblyTable::new(HeaderKind::Timed, cfg).unwrap();
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(0, 1, false), b"a", now, &mut out);
        feed(&mut t, timed(2, 1, true), b"c", now, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"ac");
        assert_eq!(out[0].missing, 1);
    }

    #[test]
    fn new_timestamp_discards_frame_without_marker() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(0, 100, false), b"lost-marker", now, &mut out);
        feed(&mut t, timed(2, 200, false), b"ne", now, &mut out);
        feed(&mut t, timed(3, 200, true), b"xt", now, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_tag, 200);
        assert_eq!(&out[0].bytes[..], b"next");
        assert_eq!(t.stats().discarded, 1);

        // Stragglers of the discarded frame are late.
        assert_eq!(feed(&mut t, timed(1, 100, true), b"x", now, &mut out), FragmentOutcome::Late);
    }

    #[test]
    fn new_timestamp_delivers_pending_frame() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(0, 100, false), b"a", now, &mut out);
        feed(&mut t, timed(2, 100, true), b"c", now, &mut out);
        feed(&mut t, timed(3, 200, false), b"d", now, &mut out);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_tag, 100);
        assert_eq!(out[0].reason, DeliveryReason::Superseded);
        assert_eq!(&out[0].bytes[..], b"ac");
    }

    #[test]
    fn older_timestamp_is_late_not_a_new_frame() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(5, 3000, false), b"cur", now, &mut out);
        assert_eq!(feed(&mut t, timed(4, 0, false), b"old", now, &mut out), FragmentOutcome::Late);
        assert_eq!(t.len(), 1);
        assert_eq!(t.stats().discarded, 0);
    }

    #[test]
    fn timestamp_wraparound_is_newer() {
        assert!(timestamp_newer(0, u32::MAX));
        assert!(timestamp_newer(3000, 0));
        assert!(!timestamp_newer(u32::MAX, 0));
        assert!(!timestamp_newer(5, 5));
    }

    #[test]
    fn timed_frame_without_marker_is_abandoned_at_timeout() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, timed(0, 100, false), b"a", t0, &mut out);
        feed(&mut t, timed(1, 100, false), b"b", t0 + 30 * MS, &mut out);

        // Idle longer than the jitter window, but no marker: kept.
        assert_eq!(t.sweep(t0 + 55 * MS, &mut out), 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.sweep(t0 + 61 * MS, &mut out), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn marker_first_waits_for_leading_fragments() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(12, 900, true), b"C", now, &mut out);
        assert!(out.is_empty(), "start of frame unknown");
        feed(&mut t, timed(10, 900, false), b"A", now, &mut out);
        assert!(out.is_empty(), "11 still outstanding");
        assert_eq!(feed(&mut t, timed(11, 900, false), b"B", now, &mut out), FragmentOutcome::Stored);

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"ABC");
        assert_eq!(out[0].reason, DeliveryReason::Complete);
        assert_eq!(out[0].missing, 0);
        assert_eq!(t.stats().late, 0);
    }

    #[test]
    fn previous_marker_anchors_reordered_frame() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(8, 800, false), b"x", now, &mut out);
        feed(&mut t, timed(9, 800, true), b"y", now, &mut out);
        assert_eq!(out.len(), 1);

        // Marker, then the tail, then the head.
        feed(&mut t, timed(12, 900, true), b"C", now, &mut out);
        feed(&mut t, timed(11, 900, false), b"B", now, &mut out);
        assert_eq!(out.len(), 1, "10 still outstanding");
        feed(&mut t, timed(10, 900, false), b"A", now, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(&out[1].bytes[..], b"ABC");
        assert_eq!(out[1].reason, DeliveryReason::Complete);
    }

    #[test]
    fn lost_leading_fragment_is_flushed_not_complete() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, timed(8, 800, false), b"x", t0, &mut out);
        feed(&mut t, timed(9, 800, true), b"y", t0, &mut out);
        out.clear();

        // Sequence 10 never arrives.
        feed(&mut t, timed(11, 900, false), b"B", t0, &mut out);
        feed(&mut t, timed(12, 900, true), b"C", t0, &mut out);
        assert!(out.is_empty());

        t.sweep(t0 + 21 * MS, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"BC");
        assert_eq!(out[0].missing, 1);
        assert_eq!(out[0].reason, DeliveryReason::JitterWindow);
    }

    #[test]
    fn single_fragment_frames_complete_once_start_is_known() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, timed(40, 100, true), b"one", t0, &mut out);
        assert!(out.is_empty());
        t.sweep(t0 + 21 * MS, &mut out);
        assert_eq!(out[0].reason, DeliveryReason::JitterWindow);
        assert_eq!(out[0].missing, 0);

        feed(&mut t, timed(41, 200, true), b"two", t0 + 30 * MS, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(&out[1].bytes[..], b"two");
        assert_eq!(out[1].reason, DeliveryReason::Complete);
    }

    #[test]
    fn pending_frame_past_timeout_is_flushed_not_abandoned() {
        let mut t = table(HeaderKind::Timed);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, timed(0, 100, false), b"0", t0, &mut out);
        feed(&mut t, timed(3, 100, true), b"3", t0 + 45 * MS, &mut out);
        feed(&mut t, timed(1, 100, false), b"1", t0 + 55 * MS, &mut out);

        // Idle for less than the jitter window, but older than the timeout.
        assert_eq!(t.sweep(t0 + 61 * MS, &mut out), 0);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].bytes[..], b"013");
        assert_eq!(out[0].missing, 1);
        assert_eq!(out[0].reason, DeliveryReason::JitterWindow);
        assert_eq!(t.stats().abandoned, 0);
        assert_eq!(t.stats().flushed, 1);
    }

    #[test]
    fn finished_records_expire_after_timeout() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        let t0 = Instant::now();

        feed(&mut t, counted(1, 1, 0), b"a", t0, &mut out);
        t.sweep(t0 + 100 * MS, &mut out);
        // The id may now be reused by a fresh frame.
        feed(&mut t, counted(1, 1, 0), b"b", t0 + 101 * MS, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn empty_payloads_are_never_delivered() {
        let mut t = table(HeaderKind::Counted);
        let mut out = Vec::new();
        feed(&mut t, counted(1, 1, 0), b"", Instant::now(), &mut out);
        assert!(out.is_empty());
        assert_eq!(t.stats().discarded, 1);
    }

    #[test]
    fn timed_fragment_limit() {
        let cfg = ReassemblyConfig {
            max_fragments: 2,
            ..Default::default()
        };
        let mut t = ReassemblyTable::new(HeaderKind::Timed, cfg).unwrap();
        let mut out = Vec::new();
        let now = Instant::now();

        feed(&mut t, timed(0, 1, false), b"a", now, &mut out);
        feed(&mut t, timed(1, 1, false), b"b", now, &mut out);
        assert_eq!(feed(&mut t, timed(2, 1, true), b"c", now, &mut out), FragmentOutcome::Invalid);
    }
}
