//! Splits encoded frames into header-prefixed datagrams.
//!
//! A frame of `len` bytes becomes `ceil(len / payload_size)` contiguous
//! chunks, in order. The header written in front of each chunk depends
//! on the stream's [`HeaderKind`]:
//!
//! - **Counted**: every chunk carries the frame id, the chunk count and
//!   its own index. Frame ids increase by one per frame and wrap.
//! - **Timed**: every chunk carries a transport-wide sequence number
//!   (wrapping modulo 2^16, never reset between frames), the frame's
//!   media timestamp and the source id. The last chunk sets the marker.

use bytes::{BufMut, Bytes, BytesMut};
use rand_core::{OsRng, RngCore};

use crate::error::CamError;
use crate::header::{
    CountedHeader, FragmentHeader, HeaderKind, MAX_PAYLOAD_TYPE, TimedHeader,
};

/// Ticks per second of the media clock used for timed headers.
pub const MEDIA_CLOCK_HZ: u32 = 90_000;

/// Default payload bytes per datagram; keeps header + payload under a
/// 1500-byte Ethernet MTU after IP and UDP headers.
pub const DEFAULT_PAYLOAD_SIZE: usize = 1400;

/// Number of fragments needed for `len` bytes at `payload_size` bytes each.
pub fn fragment_count(len: usize, payload_size: usize) -> usize {
    len.div_ceil(payload_size)
}

// ── TimedStreamParams ────────────────────────────────────────────

/// Identity and clock settings for a timed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedStreamParams {
    pub source_id: u32,
    pub payload_type: u8,
    pub initial_sequence: u16,
    pub initial_timestamp: u32,
    /// Media-clock ticks added to the timestamp after every frame.
    pub timestamp_step: u32,
}

impl TimedStreamParams {
    /// Random source id and starting timestamp, stepping the 90 kHz
    /// clock by one frame interval at `fps`.
    pub fn random(payload_type: u8, fps: f64) -> Self {
        Self {
            source_id: OsRng.next_u32(),
            payload_type,
            initial_sequence: 0,
            initial_timestamp: OsRng.next_u32(),
            timestamp_step: timestamp_step(fps),
        }
    }
}

/// Media-clock ticks per frame at `fps`.
pub fn timestamp_step(fps: f64) -> u32 {
    (f64::from(MEDIA_CLOCK_HZ) / fps.max(1e-6)) as u32
}

// ── Fragmenter ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum StreamState {
    Counted {
        next_frame_id: u32,
    },
    Timed {
        sequence: u16,
        timestamp: u32,
        source_id: u32,
        payload_type: u8,
        timestamp_step: u32,
    },
}

/// Stateful frame splitter for one outgoing stream.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    payload_size: usize,
    state: StreamState,
}

impl Fragmenter {
    /// Counted-header fragmenter starting at `first_frame_id`.
    pub fn counted(payload_size: usize, first_frame_id: u32) -> Result<Self, CamError> {
        check_payload_size(payload_size)?;
        Ok(Self {
            payload_size,
            state: StreamState::Counted {
                next_frame_id: first_frame_id,
            },
        })
    }

    /// Timed-header fragmenter for the stream described by `params`.
    pub fn timed(payload_size: usize, params: TimedStreamParams) -> Result<Self, CamError> {
        check_payload_size(payload_size)?;
        if params.payload_type > MAX_PAYLOAD_TYPE {
            return Err(CamError::InvalidHeader("payload type does not fit in 7 bits"));
        }
        Ok(Self {
            payload_size,
            state: StreamState::Timed {
                sequence: params.initial_sequence,
                timestamp: params.initial_timestamp,
                source_id: params.source_id,
                payload_type: params.payload_type,
                timestamp_step: params.timestamp_step,
            },
        })
    }

    /// Header shape this fragmenter writes.
    pub fn kind(&self) -> HeaderKind {
        match self.state {
            StreamState::Counted { .. } => HeaderKind::Counted,
            StreamState::Timed { .. } => HeaderKind::Timed,
        }
    }

    /// Maximum payload bytes per datagram.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Split `frame` into ready-to-send datagrams, in index order.
    ///
    /// An empty frame yields no datagrams and leaves the stream state
    /// untouched.
    pub fn fragment(&mut self, frame: &[u8]) -> Result<Vec<Bytes>, CamError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let count = fragment_count(frame.len(), self.payload_size);
        let header_size = self.kind().header_size();
        let chunks = frame.chunks(self.payload_size);

        match &mut self.state {
            StreamState::Counted { next_frame_id } => {
                let total = u16::try_from(count).map_err(|_| CamError::FrameTooLarge {
                    fragments: count,
                    max: usize::from(u16::MAX),
                })?;
                let frame_id = *next_frame_id;
                *next_frame_id = frame_id.wrapping_add(1);

                let datagrams = chunks
                    .enumerate()
                    .map(|(idx, chunk)| {
                        let header = FragmentHeader::Counted(CountedHeader {
                            frame_id,
                            total_fragments: total,
                            fragment_index: idx as u16,
                        });
                        datagram(&header, header_size, chunk)
                    })
                    .collect();
                Ok(datagrams)
            }
            StreamState::Timed {
                sequence,
                timestamp,
                source_id,
                payload_type,
                timestamp_step,
            } => {
                let mut datagrams = Vec::with_capacity(count);
                for (idx, chunk) in chunks.enumerate() {
                    let header = FragmentHeader::Timed(TimedHeader {
                        sequence: *sequence,
                        timestamp: *timestamp,
                        source_id: *source_id,
                        marker: idx + 1 == count,
                        payload_type: *payload_type,
                    });
                    datagrams.push(datagram(&header, header_size, chunk));
                    *sequence = sequence.wrapping_add(1);
                }
                *timestamp = timestamp.wrapping_add(*timestamp_step);
                Ok(datagrams)
            }
        }
    }
}

fn check_payload_size(payload_size: usize) -> Result<(), CamError> {
    if payload_size == 0 {
        return Err(CamError::ZeroPayloadSize);
    }
    Ok(())
}

fn datagram(header: &FragmentHeader, header_size: usize, chunk: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(header_size + chunk.len());
    header.encode_into(&mut buf);
    buf.put_slice(chunk);
    buf.freeze()
}

// ── Tests ────────────────────────────────────────────────────────
