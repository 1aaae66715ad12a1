//! Drain-order property for the byte FIFO.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use proptest::prelude::*;

use crate::{ByteFifo, FifoGeometry, HeapRegion};

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..40).prop_map(Op::Write),
        (0usize..48).prop_map(Op::Read),
    ]
}

proptest! {
    #[test]
    fn drained_bytes_match_written_bytes(ops in proptest::collection::vec(op(), 1..200)) {
        let heap = HeapRegion::new_zeroed(256);
        let fifo = unsafe { ByteFifo::init(heap.region(), FifoGeometry::new(0, 64, 64)) };
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Write(bytes) => {
                    let fits = !bytes.is_empty() && bytes.len() <= fifo.space() as usize;
                    let written = fifo.write(&bytes);
                    if fits {
                        prop_assert_eq!(written, bytes.len());
                        model.extend(bytes);
                    } else {
                        prop_assert_eq!(written, 0);
                    }
                }
                Op::Read(n) => {
                    let mut out = vec![0u8; n];
                    let got = fifo.read(&mut out);
                    let expected: Vec<u8> = model.drain(..got).collect();
                    prop_assert_eq!(&out[..got], &expected[..]);
                }
            }
            prop_assert_eq!(fifo.count() as usize, model.len());
            prop_assert_eq!(fifo.space() as usize, 63 - model.len());
        }

        let mut rest = vec![0u8; 64];
        let got = fifo.read(&mut rest);
        let expected: Vec<u8> = model.into_iter().collect();
        prop_assert_eq!(&rest[..got], &expected[..]);
    }
}
