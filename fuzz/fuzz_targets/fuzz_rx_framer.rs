//! Fuzz target: LEUART framed receiver
//!
//! Pushes arbitrary bytes through the simulated serial line into the
//! receive state machine.  No byte sequence may produce a protocol
//! violation, every delivered frame must run from start byte to signal
//! byte, and reception must end blocked unless a frame is still open.
//!
//! cargo fuzz run fuzz_rx_framer

#![no_main]

use libfuzzer_sys::fuzz_target;
use thermo_beacon::adapters::sim::SimSerial;
use thermo_beacon::app::ports::SerialLine;
use thermo_beacon::context::Context;
use thermo_beacon::drivers::leuart::{Leuart, LeuartConfig, RX_CAPACITY};

fuzz_target!(|data: &[u8]| {
    let ctx = Context::new();
    let mut leuart = Leuart::new(SimSerial::new(), LeuartConfig::default());
    leuart.open(&ctx).expect("open");

    leuart.port_mut().inject(data);
    while leuart.port().has_pending() {
        leuart.service(&ctx).expect("receiver rejected a byte stream");
        if let Some(frame) = leuart.take_frame() {
            assert_eq!(frame.first(), Some(&b'#'));
            assert_eq!(frame.last(), Some(&b'!'));
            assert!(frame.len() <= RX_CAPACITY);
            assert_eq!(frame.iter().filter(|&&b| b == b'#').count(), 1);
        }
    }

    if !leuart.is_rx_busy() {
        assert!(leuart.port().rx_blocked());
    }
});
