//! Boot self-tests.
//!
//! Run once before the event loop starts, with the radio link opened but
//! the timer stopped:
//!
//! 1. **Serial loopback receive**: TX is looped into RX and the framed
//!    receiver must pick `#TEST!` and `#SUCCESS!` out of surrounding noise.
//! 2. **Ring pattern**: fixed byte patterns pushed and popped through
//!    the framed ring.
//! 3. **Radio AT exchange**: only when a radio name is configured.
//!
//! Any mismatch is an [`Error::SelfTest`] naming the failing step.

use log::info;
use serde::Serialize;

use crate::app::ports::SerialLine;
use crate::ble::Ble;
use crate::ble::circular::{Capture, FrameRing, PopOutcome};
use crate::ble::hm10;
use crate::config::SystemConfig;
use crate::context::Context;
use crate::drivers::leuart::{Leuart, RxState};
use crate::error::{Error, Result};
use crate::events::Event;

const RING_TEST: &str = "ring";
const LOOPBACK_TEST: &str = "leuart_rx";

/// Smallest ring the pattern test fits in.
pub const RING_TEST_MIN_CAPACITY: usize = 64;

/// What ran at boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelfTestReport {
    pub loopback: bool,
    pub ring: bool,
    pub radio: bool,
}

// ───────────────────────────────────────────────────────────────
// Ring pattern
// ───────────────────────────────────────────────────────────────

/// Push and pop known patterns, then leave the ring empty.
pub fn ring_self_test<const N: usize>(ring: &mut FrameRing<N>) -> Result<()> {
    if N < RING_TEST_MIN_CAPACITY {
        return Err(Error::Config("ring self-test needs a 64-byte ring"));
    }
    let fail = |step| Error::SelfTest { test: RING_TEST, step };

    let first: [u8; 50] = core::array::from_fn(|i| i as u8 + 1);
    let second: [u8; 25] = core::array::from_fn(|i| i as u8 + 20);
    let third: [u8; 5] = core::array::from_fn(|i| i as u8 + 35);

    ring.init();
    let mut sink = Capture::<N>::default();

    ring.push(&first).map_err(|_| fail("push 50"))?;
    expect_pop(ring, &mut sink, &first).map_err(|_| fail("pop 50"))?;

    ring.push(&second).map_err(|_| fail("push 25"))?;
    ring.push(&third).map_err(|_| fail("push 5"))?;
    expect_pop(ring, &mut sink, &second).map_err(|_| fail("pop 25"))?;
    expect_pop(ring, &mut sink, &third).map_err(|_| fail("pop 5"))?;

    if ring.pop(&mut sink)? != PopOutcome::Empty {
        return Err(fail("final pop"));
    }
    ring.init();
    info!("diagnostics: ring self-test passed");
    Ok(())
}

fn expect_pop<const N: usize>(ring: &mut FrameRing<N>, sink: &mut Capture<N>, want: &[u8]) -> Result<()> {
    match ring.pop(sink)? {
        PopOutcome::Popped if sink.frame == want => Ok(()),
        _ => Err(Error::SelfTest { test: RING_TEST, step: "compare" }),
    }
}

// ───────────────────────────────────────────────────────────────
// Serial loopback receive
// ───────────────────────────────────────────────────────────────

/// Exercise the framed receiver through internal loopback.
///
/// The LEUART must be open and idle.  Leaves loopback off, reception
/// blocked, and no TX/RX-done events pending.
pub fn rx_loopback_self_test<S: SerialLine>(leuart: &mut Leuart<S>, ctx: &Context, spin_limit: u32) -> Result<()> {
    let fail = |step| Error::SelfTest { test: LOOPBACK_TEST, step };

    leuart.set_loopback(true);
    leuart.port_mut().set_rx_block(true);

    // noise before any start byte is dropped by the block
    send(leuart, ctx, b"x", spin_limit)?;
    if leuart.rx_state() != RxState::Idle || !leuart.rx_partial().is_empty() {
        return Err(fail("blocked"));
    }

    send(leuart, ctx, b"#", spin_limit)?;
    if leuart.rx_state() != RxState::Started || leuart.port().rx_blocked() {
        return Err(fail("start frame"));
    }

    send(leuart, ctx, b"fakedata#TEST!baddata", spin_limit)?;
    expect_frame(leuart, ctx, b"#TEST!").map_err(|_| fail("first frame"))?;

    send(leuart, ctx, b"attempt2#SUCCESS!nonsense", spin_limit)?;
    expect_frame(leuart, ctx, b"#SUCCESS!").map_err(|_| fail("second frame"))?;

    leuart.set_loopback(false);
    leuart.port_mut().set_rx_block(true);
    ctx.events.clear(Event::SerialTxDone);
    ctx.events.clear(Event::SerialRxDone);
    info!("diagnostics: loopback receive self-test passed");
    Ok(())
}

fn send<S: SerialLine>(leuart: &mut Leuart<S>, ctx: &Context, text: &[u8], spin_limit: u32) -> Result<()> {
    leuart.start(text, ctx)?;
    leuart.service_until(ctx, spin_limit, |l| !l.is_tx_busy())
}

fn expect_frame<S: SerialLine>(leuart: &mut Leuart<S>, ctx: &Context, want: &[u8]) -> Result<()> {
    let frame = leuart.take_frame();
    if !ctx.events.is_pending(Event::SerialRxDone) || frame.as_deref() != Some(want) {
        return Err(Error::SelfTest { test: LOOPBACK_TEST, step: "compare" });
    }
    ctx.events.clear(Event::SerialRxDone);
    if !leuart.port().rx_blocked() {
        return Err(Error::SelfTest { test: LOOPBACK_TEST, step: "re-block" });
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Boot runner
// ───────────────────────────────────────────────────────────────

/// Run every enabled self-test against an opened radio link.
pub fn run_boot_self_tests<S: SerialLine>(ble: &mut Ble<S>, config: &SystemConfig, ctx: &Context) -> Result<SelfTestReport> {
    let mut report = SelfTestReport::default();
    if !config.self_test {
        return Ok(report);
    }
    let spin = config.self_test_spin_limit;

    rx_loopback_self_test(ble.leuart_mut(), ctx, spin)?;
    report.loopback = true;

    ring_self_test(ble.ring_mut())?;
    report.ring = true;

    if let Some(name) = &config.radio_name {
        hm10::at_self_test(ble.leuart_mut(), name, spin)?;
        report.radio = true;
    }

    ctx.events.clear(Event::SerialTxDone);
    ctx.events.clear(Event::SerialRxDone);
    Ok(report)
}
