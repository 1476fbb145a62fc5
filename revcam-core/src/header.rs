//! Fixed-size fragment headers.
//!
//! Every datagram starts with one of two header shapes. Which one a
//! stream uses is decided once, by configuration, and carried around as
//! a [`HeaderKind`]; the decoder never guesses.
//!
//! ## Wire format (network byte order)
//!
//! **Counted header** (8 bytes):
//! ```text
//! frame_id:        u32  (4)
//! total_fragments: u16  (2)
//! fragment_index:  u16  (2)
//! ```
//!
//! **Timed header** (12 bytes):
//! ```text
//! V(2)=2 | P(1) | X(1) | CC(4) | M(1) | PT(7)   (2)
//! sequence:        u16  (2)
//! timestamp:       u32  (4)
//! source_id:       u32  (4)
//! ```
//!
//! The payload follows the header with no further framing.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::CamError;

/// Version carried in the top two bits of a timed header.
pub const TIMED_VERSION: u8 = 2;

/// Largest value the 7-bit payload type field can hold.
pub const MAX_PAYLOAD_TYPE: u8 = 0x7F;

// ── HeaderKind ───────────────────────────────────────────────────

/// Which header shape a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderKind {
    /// `frame_id / total / index`: completion is deterministic.
    Counted,
    /// `sequence / timestamp / source / marker`: completion by marker.
    #[default]
    Timed,
}

impl HeaderKind {
    /// Encoded header size on the wire.
    pub const fn header_size(self) -> usize {
        match self {
            HeaderKind::Counted => CountedHeader::SIZE,
            HeaderKind::Timed => TimedHeader::SIZE,
        }
    }
}

// ── CountedHeader ────────────────────────────────────────────────

/// Header for streams where each frame announces its fragment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedHeader {
    pub frame_id: u32,
    pub total_fragments: u16,
    pub fragment_index: u16,
}

impl CountedHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 8;

    /// Serialize to bytes (big-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.frame_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.total_fragments.to_be_bytes());
        buf[6..8].copy_from_slice(&self.fragment_index.to_be_bytes());
        buf
    }

    /// Deserialize from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, CamError> {
        if data.len() < Self::SIZE {
            return Err(CamError::HeaderTooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            frame_id: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            total_fragments: u16::from_be_bytes([data[4], data[5]]),
            fragment_index: u16::from_be_bytes([data[6], data[7]]),
        })
    }
}

// ── TimedHeader ──────────────────────────────────────────────────

/// Header for streams where a marker bit closes each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedHeader {
    pub sequence: u16,
    pub timestamp: u32,
    pub source_id: u32,
    pub marker: bool,
    /// 7-bit payload type; higher bits are masked off on encode.
    pub payload_type: u8,
}

impl TimedHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    /// Serialize to bytes (big-endian). Padding, extension and CSRC
    /// count are always written as zero.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let first: u16 = (u16::from(TIMED_VERSION) << 14)
            | (u16::from(self.marker) << 7)
            | u16::from(self.payload_type & MAX_PAYLOAD_TYPE);

        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&first.to_be_bytes());
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.source_id.to_be_bytes());
        buf
    }

    /// Deserialize from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, CamError> {
        if data.len() < Self::SIZE {
            return Err(CamError::HeaderTooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let first = u16::from_be_bytes([data[0], data[1]]);
        let version = (first >> 14) as u8;
        if version != TIMED_VERSION {
            return Err(CamError::UnsupportedVersion(version));
        }
        Ok(Self {
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            source_id: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            marker: (first >> 7) & 0x1 == 1,
            payload_type: (first as u8) & MAX_PAYLOAD_TYPE,
        })
    }
}

// ── FragmentHeader ───────────────────────────────────────────────

/// A decoded header of either shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentHeader {
    Counted(CountedHeader),
    Timed(TimedHeader),
}

impl FragmentHeader {
    /// The shape of this header.
    pub fn kind(&self) -> HeaderKind {
        match self {
            FragmentHeader::Counted(_) => HeaderKind::Counted,
            FragmentHeader::Timed(_) => HeaderKind::Timed,
        }
    }

    /// Append the encoded header to `out`.
    pub fn encode_into(&self, out: &mut BytesMut) {
        match self {
            FragmentHeader::Counted(h) => out.put_slice(&h.encode()),
            FragmentHeader::Timed(h) => out.put_slice(&h.encode()),
        }
    }

    /// Decode a header of the given shape from the front of `data`.
    pub fn decode(kind: HeaderKind, data: &[u8]) -> Result<Self, CamError> {
        match kind {
            HeaderKind::Counted => CountedHeader::decode(data).map(FragmentHeader::Counted),
            HeaderKind::Timed => TimedHeader::decode(data).map(FragmentHeader::Timed),
        }
    }

    /// Split a datagram into its header and payload.
    pub fn split(kind: HeaderKind, datagram: &[u8]) -> Result<(Self, &[u8]), CamError> {
        let header = Self::decode(kind, datagram)?;
        Ok((header, &datagram[kind.header_size()..]))
    }
}

// ── Tests ────────────────────────────────────────────────────────
