//! Property tests for fragmentation and reassembly.

use std::net::SocketAddr;

use bytes::Bytes;
use proptest::prelude::*;
use revcam_core::{
    CompletedFrame, FragmentHeader, Fragmenter, HeaderKind, ReassemblyConfig, ReassemblyTable,
    TimedStreamParams,
};
use tokio::time::Instant;

fn peer() -> SocketAddr {
    "192.168.1.20:5004".parse().unwrap()
}

/// A frame, a payload size, and a delivery order for its fragments.
fn shuffled_frame() -> impl Strategy<Value = (Vec<u8>, usize, Vec<usize>)> {
    (proptest::collection::vec(any::<u8>(), 1..6000), 16usize..1400).prop_flat_map(
        |(frame, payload)| {
            let n = frame.len().div_ceil(payload);
            (
                Just(frame),
                Just(payload),
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            )
        },
    )
}

fn feed(
    table: &mut ReassemblyTable,
    kind: HeaderKind,
    datagram: &[u8],
    now: Instant,
    out: &mut Vec<CompletedFrame>,
) {
    let (header, payload) = FragmentHeader::split(kind, datagram).unwrap();
    table.ingest(peer(), &header, Bytes::copy_from_slice(payload), now, out);
}

proptest! {
    #[test]
    fn counted_any_order_reassembles_exactly(
        (frame, payload, order) in shuffled_frame(),
        first_id in any::<u32>(),
    ) {
        let mut frag = Fragmenter::counted(payload, first_id).unwrap();
        let datagrams = frag.fragment(&frame).unwrap();
        prop_assert_eq!(datagrams.len(), order.len());

        let mut table = ReassemblyTable::new(HeaderKind::Counted, ReassemblyConfig::default()).unwrap();
        let now = Instant::now();
        let mut out = Vec::new();
        for &i in &order {
            feed(&mut table, HeaderKind::Counted, &datagrams[i], now, &mut out);
        }

        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(&out[0].bytes[..], &frame[..]);
        prop_assert_eq!(out[0].frame_tag, first_id);
        prop_assert!(table.is_empty());
    }

    #[test]
    fn timed_any_order_reassembles_exactly_after_previous_frame(
        (frame, payload, order) in shuffled_frame(),
        initial_sequence in any::<u16>(),
        initial_timestamp in any::<u32>(),
    ) {
        let params = TimedStreamParams {
            source_id: 9,
            payload_type: 96,
            initial_sequence,
            initial_timestamp,
            timestamp_step: 3000,
        };
        let mut frag = Fragmenter::timed(payload, params).unwrap();
        let mut table = ReassemblyTable::new(HeaderKind::Timed, ReassemblyConfig::default()).unwrap();
        let now = Instant::now();
        let mut out = Vec::new();

        // A two-fragment frame ahead of it fixes where the next one starts.
        for d in frag.fragment(&vec![0xEE; payload + 1]).unwrap() {
            feed(&mut table, HeaderKind::Timed, &d, now, &mut out);
        }
        prop_assert_eq!(out.len(), 1);
        out.clear();

        let datagrams = frag.fragment(&frame).unwrap();
        for &i in &order {
            feed(&mut table, HeaderKind::Timed, &datagrams[i], now, &mut out);
        }

        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(&out[0].bytes[..], &frame[..]);
        prop_assert_eq!(out[0].missing, 0);
        prop_assert!(table.is_empty());
    }

    #[test]
    fn duplicates_never_deliver_twice(
        (frame, payload, order) in shuffled_frame(),
        repeats in proptest::collection::vec(any::<prop::sample::Index>(), 1..8),
    ) {
        let mut frag = Fragmenter::counted(payload, 1).unwrap();
        let datagrams = frag.fragment(&frame).unwrap();

        let mut table = ReassemblyTable::new(HeaderKind::Counted, ReassemblyConfig::default()).unwrap();
        let now = Instant::now();
        let mut out = Vec::new();
        for &i in &order {
            feed(&mut table, HeaderKind::Counted, &datagrams[i], now, &mut out);
        }
        for idx in &repeats {
            feed(&mut table, HeaderKind::Counted, &datagrams[idx.index(datagrams.len())], now, &mut out);
        }

        prop_assert_eq!(out.len(), 1);
        prop_assert!(table.is_empty());
    }

    #[test]
    fn fragments_respect_payload_size(
        frame in proptest::collection::vec(any::<u8>(), 0..20_000),
        payload in 1usize..2000,
    ) {
        let mut frag = Fragmenter::counted(payload, 0).unwrap();
        let datagrams = frag.fragment(&frame).unwrap();
        prop_assert_eq!(datagrams.len(), frame.len().div_ceil(payload));
        for d in &datagrams {
            prop_assert!(d.len() <= HeaderKind::Counted.header_size() + payload);
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic_the_decoder(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = FragmentHeader::decode(HeaderKind::Counted, &data);
        let _ = FragmentHeader::decode(HeaderKind::Timed, &data);
    }
}
