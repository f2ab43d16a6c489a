//! Fuzz target: `FrameRing` push/pop sequences
//!
//! Interprets the input as a stream of operations against a 64-byte ring
//! and checks that accounting never drifts: used bytes always match the
//! headers plus payloads still queued, and popped frames come out in
//! push order.
//!
//! cargo fuzz run fuzz_frame_ring

#![no_main]

use std::collections::VecDeque;

use libfuzzer_sys::fuzz_target;
use thermo_beacon::ble::circular::{Capture, FrameRing, PopOutcome};

fuzz_target!(|data: &[u8]| {
    let mut ring = FrameRing::<64>::new();
    let mut sink = Capture::<64>::default();
    let mut queued: VecDeque<Vec<u8>> = VecDeque::new();
    let mut bytes = data.iter().copied();

    while let Some(op) = bytes.next() {
        match op & 0b11 {
            // push: low bits pick a length, payload bytes follow
            0 | 1 => {
                let len = usize::from(op >> 2);
                let payload: Vec<u8> = bytes.by_ref().take(len).collect();
                if ring.push(&payload).is_ok() {
                    queued.push_back(payload);
                }
            }
            2 => {
                sink.busy = false;
                match ring.pop(&mut sink) {
                    Ok(PopOutcome::Popped) => {
                        let want = queued.pop_front().expect("ring popped a frame the model lacks");
                        assert_eq!(sink.frame.as_slice(), want.as_slice());
                    }
                    Ok(PopOutcome::Empty) => assert!(queued.is_empty()),
                    other => panic!("unexpected pop result {other:?}"),
                }
            }
            _ => {
                sink.busy = true;
                let before = ring.clone();
                let outcome = ring.pop(&mut sink);
                assert!(matches!(outcome, Ok(PopOutcome::NotReady | PopOutcome::Empty)));
                assert_eq!(ring, before);
            }
        }

        let used: usize = queued.iter().map(|f| f.len() + 1).sum();
        assert_eq!(ring.used(), used);
        assert!(ring.space_available() < ring.capacity());
    }
});
