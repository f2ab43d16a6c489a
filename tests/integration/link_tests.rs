//! Radio link tests: framed ring + LEUART over the simulated serial line.

use thermo_beacon::adapters::sim::SimSerial;
use thermo_beacon::app::ports::SerialLine;
use thermo_beacon::ble::Ble;
use thermo_beacon::ble::circular::PopOutcome;
use thermo_beacon::context::Context;
use thermo_beacon::drivers::leuart::{LeuartConfig, RxState, TX_CAPACITY};
use thermo_beacon::error::{Error, ResourceError};
use thermo_beacon::events::Event;
use thermo_beacon::power::EnergyMode;

fn open_link(ctx: &Context) -> Ble<SimSerial> {
    let mut ble = Ble::new(SimSerial::new(), LeuartConfig::default());
    ble.open(ctx).unwrap();
    ble
}

/// Run the serial interrupt handler until the line goes quiet.
fn drain(ble: &mut Ble<SimSerial>, ctx: &Context) {
    for _ in 0..1000 {
        if !ble.leuart().port().has_pending() {
            return;
        }
        ble.service(ctx).unwrap();
    }
    panic!("serial line never went quiet");
}

// ── Transmit ──────────────────────────────────────────────────

#[test]
fn frames_drain_one_per_tx_done() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);

    ble.write(b"\nTempC = 21.0", &ctx).unwrap();
    ble.write(b"\nTempC = 21.5", &ctx).unwrap();
    assert_eq!(ctx.power.block_count(EnergyMode::Em3), 2, "RX armed + TX busy");

    let mut done = 0;
    while done < 2 {
        drain(&mut ble, &ctx);
        assert!(ctx.events.is_pending(Event::SerialTxDone));
        ctx.events.clear(Event::SerialTxDone);
        done += 1;
        ble.pump(&ctx).unwrap();
    }
    assert_eq!(ble.pump(&ctx), Ok(PopOutcome::Empty));
    assert_eq!(ble.leuart().port().radio_received(), b"\nTempC = 21.0\nTempC = 21.5");
    assert_eq!(ctx.power.block_count(EnergyMode::Em3), 1);
}

#[test]
fn empty_transmit_completes_immediately() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);
    ble.leuart_mut().start(b"", &ctx).unwrap();
    assert!(ctx.events.is_pending(Event::SerialTxDone));
    assert!(!ble.leuart().is_tx_busy());
    assert_eq!(ctx.power.block_count(EnergyMode::Em3), 1);
}

#[test]
fn oversized_transmit_is_rejected() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);
    let big = [b'x'; TX_CAPACITY + 1];
    assert_eq!(
        ble.leuart_mut().start(&big, &ctx),
        Err(Error::Resource(ResourceError::PayloadTooLong { len: 101, max: 100 }))
    );
    assert!(!ble.leuart().is_tx_busy());
}

#[test]
fn full_ring_rejects_without_corrupting_queue() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);
    ble.write(&[b'a'; 40], &ctx).unwrap(); // popped straight into the transmitter
    ble.write(&[b'b'; 40], &ctx).unwrap();
    assert!(matches!(
        ble.write(&[b'c'; 40], &ctx),
        Err(Error::Resource(ResourceError::RingFull { .. }))
    ));
    assert_eq!(ble.ring().frames(), 1);
}

// ── Receive ───────────────────────────────────────────────────

#[test]
fn overflowing_frame_is_discarded_and_counted() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);

    let mut long = vec![b'#'];
    long.extend_from_slice(&[b'z'; 40]);
    long.push(b'!');
    ble.leuart_mut().port_mut().inject(&long);
    drain(&mut ble, &ctx);

    assert_eq!(ble.take_frame(), None);
    assert!(!ctx.events.is_pending(Event::SerialRxDone));
    assert_eq!(ble.leuart().rx_overflows(), 1);
    assert!(ble.leuart().port().rx_blocked());

    ble.leuart_mut().port_mut().inject(b"#TEMPF!");
    drain(&mut ble, &ctx);
    assert_eq!(ble.take_frame().as_deref(), Some(&b"#TEMPF!"[..]));
    assert!(ctx.events.is_pending(Event::SerialRxDone));
}

#[test]
fn start_byte_mid_frame_restarts() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);
    ble.leuart_mut().port_mut().inject(b"#TE#TEMPC!");
    drain(&mut ble, &ctx);
    assert_eq!(ble.take_frame().as_deref(), Some(&b"#TEMPC!"[..]));
    assert_eq!(ble.leuart().rx_state(), RxState::Finished);
}

#[test]
fn receive_and_transmit_interleave() {
    let ctx = Context::new();
    let mut ble = open_link(&ctx);
    ble.write(b"\nTempF = 70.1", &ctx).unwrap();
    ble.leuart_mut().port_mut().inject(b"#TEMPC!");
    drain(&mut ble, &ctx);

    assert!(ctx.events.is_pending(Event::SerialTxDone));
    assert!(ctx.events.is_pending(Event::SerialRxDone));
    assert_eq!(ble.take_frame().as_deref(), Some(&b"#TEMPC!"[..]));
    assert_eq!(ble.leuart().port().radio_received(), b"\nTempF = 70.1");
}
