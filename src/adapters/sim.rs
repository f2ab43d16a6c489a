//! Simulated peripherals for host builds and tests.
//!
//! Each type models just enough register behaviour for the drivers'
//! state machines to run unmodified:
//!
//! | Type            | Models                                              |
//! |-----------------|-----------------------------------------------------|
//! | `SimSi7021Bus`  | I2C master with an Si7021 that NACKs while converting |
//! | `SimSerial`     | LEUART with start/signal framing, loopback, HM-10   |
//! | `SimTimer`      | LETIMER raising COMP0/COMP1/UF once per period      |
//! | `SimSleep`      | EMU, records every sleep entry                      |
//! | `SimPin`        | GPIO output                                         |
//!
//! Interrupt flags are latched in a `pending` set and handed out by
//! `take_pending()`, so the caller decides when "interrupts" run.

use std::collections::VecDeque;

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use log::{debug, trace};

use crate::app::ports::{SerialIrq, SerialLine, SleepControl, TimerIrq, TimerPort, TwoWireBus, TwoWireIrq};
use crate::power::EnergyMode;
use crate::sensors::si7021::SI7021_ADDRESS;

// ───────────────────────────────────────────────────────────────
// Two-wire bus with an Si7021 attached
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusPhase {
    Idle,
    Address,
    Command,
    Converting,
    Data,
}

pub struct SimSi7021Bus {
    address: u8,
    raw: u16,
    conversion_naks: u32,
    naks_left: u32,
    phase: BusPhase,
    data: [u8; 2],
    data_index: usize,
    busy: bool,
    pending: TwoWireIrq,
    next: TwoWireIrq,
    resets: u32,
    transactions: u32,
}

impl SimSi7021Bus {
    pub fn new() -> Self {
        Self {
            address: SI7021_ADDRESS,
            raw: 0x6400,
            conversion_naks: 3,
            naks_left: 0,
            phase: BusPhase::Idle,
            data: [0; 2],
            data_index: 0,
            busy: false,
            pending: TwoWireIrq::empty(),
            next: TwoWireIrq::empty(),
            resets: 0,
            transactions: 0,
        }
    }

    /// Raw value returned by the next conversion.
    pub fn set_raw(&mut self, raw: u16) {
        self.raw = raw;
    }

    /// Set the raw value from a Celsius temperature.
    pub fn set_celsius(&mut self, celsius: f32) {
        let raw = (celsius + 46.85) * 65536.0 / 175.72;
        self.raw = raw.clamp(0.0, f32::from(u16::MAX)) as u16;
    }

    /// Read-address NACKs before each conversion completes.
    pub fn set_conversion_naks(&mut self, naks: u32) {
        self.conversion_naks = naks;
    }

    /// Move the sensor to another address (so it stops answering).
    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.next.is_empty()
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Transactions that ended with a STOP.
    pub fn transactions(&self) -> u32 {
        self.transactions
    }
}

impl Default for SimSi7021Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl TwoWireBus for SimSi7021Bus {
    fn is_idle(&self) -> bool {
        !self.busy
    }

    fn start(&mut self) {
        self.busy = true;
        self.phase = BusPhase::Address;
    }

    fn write(&mut self, byte: u8) {
        match self.phase {
            BusPhase::Address => {
                let (address, read) = (byte >> 1, byte & 1 == 1);
                if address != self.address {
                    self.pending.insert(TwoWireIrq::NACK);
                } else if !read {
                    self.pending.insert(TwoWireIrq::ACK);
                    self.phase = BusPhase::Command;
                } else if self.naks_left > 0 {
                    self.naks_left -= 1;
                    self.pending.insert(TwoWireIrq::NACK);
                } else {
                    self.pending.insert(TwoWireIrq::ACK);
                    self.next.insert(TwoWireIrq::RXDATAV);
                    self.data = self.raw.to_be_bytes();
                    self.data_index = 0;
                    self.phase = BusPhase::Data;
                }
            }
            BusPhase::Command => {
                trace!("sim i2c: command 0x{:02X}", byte);
                self.pending.insert(TwoWireIrq::ACK);
                self.naks_left = self.conversion_naks;
                self.phase = BusPhase::Converting;
            }
            BusPhase::Idle | BusPhase::Converting | BusPhase::Data => {}
        }
    }

    fn read(&mut self) -> u8 {
        let byte = self.data.get(self.data_index).copied().unwrap_or(0xFF);
        self.data_index += 1;
        byte
    }

    fn ack(&mut self) {
        if self.phase == BusPhase::Data {
            self.pending.insert(TwoWireIrq::RXDATAV);
        }
    }

    fn nack(&mut self) {}

    fn stop(&mut self) {
        self.phase = BusPhase::Idle;
        self.pending.insert(TwoWireIrq::MSTOP);
        self.transactions += 1;
    }

    fn abort(&mut self) {
        self.busy = false;
        self.phase = BusPhase::Idle;
        self.pending = TwoWireIrq::empty();
        self.next = TwoWireIrq::empty();
    }

    fn reset_bus(&mut self) {
        self.resets += 1;
        self.abort();
    }

    fn take_pending(&mut self) -> TwoWireIrq {
        let out = self.pending;
        if out.contains(TwoWireIrq::MSTOP) {
            self.busy = false;
        }
        self.pending = self.next;
        self.next = TwoWireIrq::empty();
        out
    }
}

// ───────────────────────────────────────────────────────────────
// LEUART with an HM-10 radio on the far side
// ───────────────────────────────────────────────────────────────

/// Longest AT command the radio model buffers.
const RADIO_COMMAND_CAP: usize = 64;

struct Hm10Model {
    name: String,
    command: Vec<u8>,
    resets: u32,
    silent: bool,
}

impl Hm10Model {
    fn on_byte(&mut self, byte: u8) {
        if self.command.len() < RADIO_COMMAND_CAP {
            self.command.push(byte);
        }
    }

    /// Answer the buffered command, if it is one.
    fn respond(&mut self) -> Vec<u8> {
        let command = core::mem::take(&mut self.command);
        if self.silent {
            return Vec::new();
        }
        if command == b"AT" {
            b"OK".to_vec()
        } else if command == b"AT+RESET" {
            self.resets += 1;
            b"OK+RESET".to_vec()
        } else if let Some(name) = command.strip_prefix(b"AT+NAME") {
            self.name = String::from_utf8_lossy(name).into_owned();
            let mut reply = b"OK+Set:".to_vec();
            reply.extend_from_slice(name);
            reply
        } else {
            Vec::new()
        }
    }
}

pub struct SimSerial {
    start: u8,
    signal: u8,
    loopback: bool,
    rx_blocked: bool,
    tx_level_irq: bool,
    tx_since_complete: bool,
    pending: SerialIrq,
    rx_data: Option<u8>,
    inbound: VecDeque<u8>,
    dropped: usize,
    on_air: Vec<u8>,
    radio: Hm10Model,
}

impl SimSerial {
    pub fn new() -> Self {
        Self {
            start: b'#',
            signal: b'!',
            loopback: false,
            rx_blocked: false,
            tx_level_irq: false,
            tx_since_complete: false,
            pending: SerialIrq::empty(),
            rx_data: None,
            inbound: VecDeque::new(),
            dropped: 0,
            on_air: Vec::new(),
            radio: Hm10Model {
                name: String::from("HMSoft"),
                command: Vec::new(),
                resets: 0,
                silent: false,
            },
        }
    }

    /// Queue bytes arriving from the connected central.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Every byte the radio has transmitted over the air.
    pub fn radio_received(&self) -> &[u8] {
        &self.on_air
    }

    pub fn take_radio_received(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.on_air)
    }

    pub fn radio_name(&self) -> &str {
        &self.radio.name
    }

    pub fn radio_resets(&self) -> u32 {
        self.radio.resets
    }

    /// A silent radio never answers AT commands.
    pub fn set_radio_silent(&mut self, silent: bool) {
        self.radio.silent = silent;
    }

    /// Bytes discarded by the receive block.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || (self.rx_data.is_none() && !self.inbound.is_empty())
    }

    fn rx_flags_pending(&self) -> bool {
        let rx = SerialIrq::STARTF | SerialIrq::RXDATAV | SerialIrq::SIGF;
        self.pending.bits() & rx.bits() != 0
    }

    /// Move one byte from the line into the receiver.
    fn deliver(&mut self) {
        if self.rx_data.is_some() {
            return;
        }
        let Some(byte) = self.inbound.pop_front() else {
            return;
        };
        let mut flags = SerialIrq::RXDATAV;
        if byte == self.start {
            // start-frame unblocks reception in hardware
            self.rx_blocked = false;
            flags.insert(SerialIrq::STARTF);
        } else if self.rx_blocked {
            self.dropped += 1;
            return;
        }
        if byte == self.signal {
            flags.insert(SerialIrq::SIGF);
        }
        self.rx_data = Some(byte);
        self.pending.insert(flags);
    }
}

impl Default for SimSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLine for SimSerial {
    fn configure_frames(&mut self, start: u8, signal: u8) {
        self.start = start;
        self.signal = signal;
    }

    fn write_byte(&mut self, byte: u8) {
        if self.loopback {
            self.inbound.push_back(byte);
        } else {
            self.on_air.push(byte);
            self.radio.on_byte(byte);
        }
        if self.tx_level_irq {
            self.tx_since_complete = true;
            self.pending.insert(SerialIrq::TXBL);
        } else {
            self.pending.insert(SerialIrq::TXC);
        }
    }

    fn read_byte(&mut self) -> u8 {
        self.pending.remove(SerialIrq::RXDATAV);
        self.rx_data.take().unwrap_or(0)
    }

    fn tx_ready(&mut self) -> bool {
        true
    }

    fn rx_ready(&mut self) -> bool {
        if self.rx_data.is_none() && self.inbound.is_empty() {
            let reply = self.radio.respond();
            if !reply.is_empty() {
                debug!("sim hm10: reply {:?}", String::from_utf8_lossy(&reply));
            }
            self.inbound.extend(reply);
        }
        while self.rx_data.is_none() && !self.inbound.is_empty() {
            self.deliver();
        }
        self.rx_data.is_some()
    }

    fn set_tx_level_irq(&mut self, enabled: bool) {
        self.tx_level_irq = enabled;
        if enabled {
            self.pending.insert(SerialIrq::TXBL);
        } else {
            self.pending.remove(SerialIrq::TXBL);
            if self.tx_since_complete {
                self.tx_since_complete = false;
                self.pending.insert(SerialIrq::TXC);
            }
        }
    }

    fn set_rx_block(&mut self, blocked: bool) {
        self.rx_blocked = blocked;
    }

    fn rx_blocked(&self) -> bool {
        self.rx_blocked
    }

    fn set_loopback(&mut self, enabled: bool) {
        self.loopback = enabled;
    }

    fn take_pending(&mut self) -> SerialIrq {
        if !self.rx_flags_pending() {
            self.deliver();
        }
        core::mem::take(&mut self.pending)
    }

    fn clear_pending(&mut self) {
        self.pending = SerialIrq::empty();
        self.rx_data = None;
    }
}

// ───────────────────────────────────────────────────────────────
// LETIMER
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimTimer {
    top: u32,
    active: u32,
    running: bool,
    pending: TimerIrq,
    periods: u32,
}

impl SimTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let one full period pass.  Returns `false` if the timer is stopped.
    pub fn elapse_period(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.pending.insert(TimerIrq::COMP0 | TimerIrq::COMP1 | TimerIrq::UF);
        self.periods += 1;
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn periods(&self) -> u32 {
        self.periods
    }
}

impl TimerPort for SimTimer {
    fn configure(&mut self, top: u32, active: u32) {
        self.top = top;
        self.active = active;
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    fn take_pending(&mut self) -> TimerIrq {
        core::mem::take(&mut self.pending)
    }
}

// ───────────────────────────────────────────────────────────────
// EMU and GPIO
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimSleep {
    pub entered: Vec<EnergyMode>,
}

impl SimSleep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, mode: EnergyMode) -> usize {
        self.entered.iter().filter(|&&m| m == mode).count()
    }
}

impl SleepControl for SimSleep {
    fn enter(&mut self, mode: EnergyMode) {
        self.entered.push(mode);
    }
}

#[derive(Debug, Default)]
pub struct SimPin {
    high: bool,
    writes: u32,
}

impl SimPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_receiver_drops_until_start_byte() {
        let mut port = SimSerial::new();
        port.set_rx_block(true);
        port.inject(b"xy#A");
        assert!(port.take_pending().is_empty());
        assert!(port.take_pending().is_empty());
        assert_eq!(port.dropped(), 2);

        let flags = port.take_pending();
        assert!(flags.contains(SerialIrq::STARTF));
        assert!(!port.rx_blocked());
        assert_eq!(port.read_byte(), b'#');

        assert_eq!(port.take_pending(), SerialIrq::RXDATAV);
        assert_eq!(port.read_byte(), b'A');
    }

    #[test]
    fn signal_byte_raises_sigf_with_data() {
        let mut port = SimSerial::new();
        port.inject(b"!");
        assert_eq!(port.take_pending(), SerialIrq::RXDATAV | SerialIrq::SIGF);
    }

    #[test]
    fn interrupt_transmit_ends_with_single_complete() {
        let mut port = SimSerial::new();
        port.set_tx_level_irq(true);
        assert_eq!(port.take_pending(), SerialIrq::TXBL);
        port.write_byte(b'a');
        port.set_tx_level_irq(false);
        assert_eq!(port.take_pending(), SerialIrq::TXC);
        assert_eq!(port.radio_received(), b"a");
    }

    #[test]
    fn radio_answers_at_commands_when_polled() {
        let mut port = SimSerial::new();
        for &b in b"AT+NAMEBEACON" {
            port.write_byte(b);
        }
        let mut reply = Vec::new();
        while port.rx_ready() {
            reply.push(port.read_byte());
        }
        assert_eq!(reply, b"OK+Set:BEACON");
        assert_eq!(port.radio_name(), "BEACON");
    }

    #[test]
    fn sensor_naks_while_converting() {
        let mut bus = SimSi7021Bus::new();
        bus.set_conversion_naks(2);
        bus.set_raw(0xBEEF);
        bus.start();
        bus.write(0x80);
        assert_eq!(bus.take_pending(), TwoWireIrq::ACK);
        bus.write(0xF3);
        assert_eq!(bus.take_pending(), TwoWireIrq::ACK);
        for _ in 0..2 {
            bus.start();
            bus.write(0x81);
            assert_eq!(bus.take_pending(), TwoWireIrq::NACK);
        }
        bus.start();
        bus.write(0x81);
        assert_eq!(bus.take_pending(), TwoWireIrq::ACK);
        assert_eq!(bus.take_pending(), TwoWireIrq::RXDATAV);
        assert_eq!(bus.read(), 0xBE);
        bus.ack();
        assert_eq!(bus.take_pending(), TwoWireIrq::RXDATAV);
        assert_eq!(bus.read(), 0xEF);
        bus.stop();
        assert!(!bus.is_idle());
        assert_eq!(bus.take_pending(), TwoWireIrq::MSTOP);
        assert!(bus.is_idle());
    }
}
