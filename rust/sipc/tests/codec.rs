//! Decoder behaviour under arbitrary fragmentation of the inbound stream.

use proptest::prelude::*;
use sipc::{Decoder, Format, Header, MAX_RX_SIZE, ProtocolVersion, Segment, encode};

const FRAMED: [Format; 3] = [Format::Fmt, Format::Raw, Format::Rfs];

fn payload_len() -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(0usize),
        Just(1),
        Just(2),
        Just(5),
        Just(MAX_RX_SIZE - 1),
        Just(MAX_RX_SIZE),
        Just(MAX_RX_SIZE + 1),
        Just(2 * MAX_RX_SIZE + 3),
        0usize..600,
    ]
}

fn header_for(format: Format, len: usize) -> Header {
    match format {
        Format::Fmt => Header::fmt(len, 0x11),
        Format::Rfs => Header::rfs(len, 0x02, 0x33),
        _ => Header::raw(len, 0x07),
    }
}

/// Split `bytes` at the given fractional cut points.
fn split<'a>(bytes: &'a [u8], cuts: &[f64]) -> Vec<&'a [u8]> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| (c * bytes.len() as f64) as usize)
        .collect();
    points.push(bytes.len());
    points.sort_unstable();
    let mut pieces = Vec::new();
    let mut at = 0;
    for p in points {
        if p > at {
            pieces.push(&bytes[at..p]);
            at = p;
        }
    }
    pieces
}

/// Join segments back into whole frames: header plus full payload.
fn reassemble(segments: Vec<Segment>) -> Vec<(Header, Vec<u8>)> {
    let mut frames: Vec<(Header, Vec<u8>)> = Vec::new();
    for seg in segments {
        assert!(seg.data.len() <= MAX_RX_SIZE, "segment of {}", seg.data.len());
        if seg.first {
            frames.push((seg.header, Vec::new()));
        }
        let Some((header, payload)) = frames.last_mut() else {
            panic!("segment before any first segment");
        };
        assert_eq!(*header, seg.header);
        payload.extend_from_slice(&seg.data);
    }
    frames
}

fn reencode(frames: &[(Header, Vec<u8>)]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|(header, payload)| encode(header, payload))
        .collect()
}

#[test]
fn boundary_sizes_survive_byte_at_a_time_decoding() {
    for format in FRAMED {
        let header_size = Header::size_of(format).unwrap();
        for len in [
            0,
            1,
            header_size - 1,
            MAX_RX_SIZE - 1,
            MAX_RX_SIZE,
            MAX_RX_SIZE + 1,
        ] {
            let payload: Vec<u8> = (0..len).map(|b| (b * 7) as u8).collect();
            let frame = encode(&header_for(format, len), &payload);

            let mut decoder = Decoder::new(format, ProtocolVersion::V40).unwrap();
            let mut segments = Vec::new();
            for byte in &frame {
                decoder
                    .decode(std::slice::from_ref(byte), |seg| segments.push(seg))
                    .unwrap();
            }
            assert!(!decoder.in_frame());

            let frames = reassemble(segments);
            assert_eq!(frames.len(), 1, "{format:?} len {len}");
            assert_eq!(frames[0].1, payload, "{format:?} len {len}");
            assert_eq!(reencode(&frames), frame, "{format:?} len {len}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fragmented_frames_reassemble_in_order(
        format in prop_oneof![Just(Format::Fmt), Just(Format::Raw), Just(Format::Rfs)],
        lens in proptest::collection::vec(payload_len(), 1..4),
        cuts in proptest::collection::vec(0.0f64..1.0, 0..12),
    ) {
        let mut stream = Vec::new();
        let mut expected = Vec::new();
        for (i, len) in lens.iter().enumerate() {
            let payload: Vec<u8> = (0..*len).map(|b| (b + i) as u8).collect();
            stream.extend(encode(&header_for(format, *len), &payload));
            expected.push(payload);
        }

        let mut decoder = Decoder::new(format, ProtocolVersion::V40).unwrap();
        let mut segments: Vec<Segment> = Vec::new();
        for piece in split(&stream, &cuts) {
            decoder.decode(piece, |seg| segments.push(seg)).unwrap();
        }
        prop_assert!(!decoder.in_frame());

        let frames = reassemble(segments);
        let payloads: Vec<Vec<u8>> = frames.iter().map(|(_, p)| p.clone()).collect();
        prop_assert_eq!(payloads, expected);
        prop_assert_eq!(reencode(&frames), stream);
    }
}
