//! Low-energy UART driver: interrupt-driven transmit and framed receive.
//!
//! ## Transmit
//!
//! ```text
//!            start()            TXBL (index < len-1)
//! Initialize ───────▶ SendChar ◀──────┐
//!    ▲                  │   └─────────┘
//!    │                  │ TXBL (last byte) / disable TXBL
//!    │                  ▼
//!  Finish ◀──────── WaitTxc
//!          TXC: unblock EM3, post TX done
//! ```
//!
//! ## Receive
//!
//! Reception is hardware-blocked until the start-frame byte arrives, so
//! line noise and chatter between frames never reach the buffer.
//!
//! ```text
//!        open()         STARTF            RXDATAV          SIGF
//!  Init ───────▶ Idle ─────────▶ Started ─────────▶ Receiving ──────▶ Finished
//!                  ▲                ▲  └──────SIGF──────┐  │            │
//!                  │                └────── STARTF ─────┼──┘            │
//!                  │                                    ▼               │
//!                  └────────────── re-armed (blocked) ◀─────────────────┘
//! ```
//!
//! A start byte seen mid-frame restarts the frame.  Bytes past
//! [`RX_CAPACITY`] are dropped and the frame is discarded at its end
//! marker; [`Leuart::rx_overflows`] counts such frames.

use heapless::Vec;
use log::{debug, info, warn};

use crate::app::ports::{SerialIrq, SerialLine};
use crate::context::Context;
use crate::error::{Error, Peripheral, PreconditionError, ProtocolViolation, ResourceError, Result};
use crate::events::Event;
use crate::power::EnergyMode;

/// The LEUART clock does not run below EM2.
pub const LEUART_TX_EM: EnergyMode = EnergyMode::Em3;
pub const LEUART_RX_EM: EnergyMode = EnergyMode::Em3;

pub const TX_CAPACITY: usize = 100;
pub const RX_CAPACITY: usize = 32;

pub type RxFrame = Vec<u8, RX_CAPACITY>;

// ───────────────────────────────────────────────────────────────
// Transmit machine
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Initialize,
    SendChar,
    WaitTxc,
    Finish,
}

impl TxState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::SendChar => "SendChar",
            Self::WaitTxc => "WaitTxc",
            Self::Finish => "Finish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    BufferLevel,
    Complete,
}

impl TxEvent {
    pub const fn name(self) -> &'static str {
        match self {
            Self::BufferLevel => "TXBL",
            Self::Complete => "TXC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxAction {
    SendByte,
    SendLastByte,
    Complete,
}

/// Transmit transition table; `remaining` is the number of bytes not yet
/// written to the transmit buffer.
pub fn tx_transition(
    state: TxState,
    event: TxEvent,
    remaining: usize,
) -> core::result::Result<(TxState, TxAction), ProtocolViolation> {
    match (state, event) {
        (TxState::SendChar, TxEvent::BufferLevel) if remaining > 1 => {
            Ok((TxState::SendChar, TxAction::SendByte))
        }
        (TxState::SendChar, TxEvent::BufferLevel) if remaining == 1 => {
            Ok((TxState::WaitTxc, TxAction::SendLastByte))
        }
        (TxState::WaitTxc, TxEvent::Complete) => Ok((TxState::Finish, TxAction::Complete)),
        (state, event) => Err(ProtocolViolation {
            peripheral: Peripheral::SerialTx,
            state: state.name(),
            event: event.name(),
        }),
    }
}

// ───────────────────────────────────────────────────────────────
// Receive machine
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Init,
    Idle,
    Started,
    Receiving,
    Finished,
}

impl RxState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Idle => "Idle",
            Self::Started => "Started",
            Self::Receiving => "Receiving",
            Self::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    StartFrame,
    Data,
    Signal,
}

impl RxEvent {
    pub const fn name(self) -> &'static str {
        match self {
            Self::StartFrame => "STARTF",
            Self::Data => "RXDATAV",
            Self::Signal => "SIGF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxAction {
    BeginFrame,
    Store,
    EndFrame,
}

pub fn rx_transition(
    state: RxState,
    event: RxEvent,
) -> core::result::Result<(RxState, RxAction), ProtocolViolation> {
    use RxState::{Finished, Idle, Receiving, Started};

    match (state, event) {
        (Idle | Started | Receiving | Finished, RxEvent::StartFrame) => {
            Ok((Started, RxAction::BeginFrame))
        }
        (Started | Receiving, RxEvent::Data) => Ok((Receiving, RxAction::Store)),
        (Started | Receiving, RxEvent::Signal) => Ok((Finished, RxAction::EndFrame)),
        (state, event) => Err(ProtocolViolation {
            peripheral: Peripheral::SerialRx,
            state: state.name(),
            event: event.name(),
        }),
    }
}

// ───────────────────────────────────────────────────────────────
// Driver
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeuartConfig {
    pub start_frame: u8,
    pub signal_frame: u8,
    pub tx_done: Event,
    pub rx_done: Event,
}

impl Default for LeuartConfig {
    fn default() -> Self {
        Self {
            start_frame: b'#',
            signal_frame: b'!',
            tx_done: Event::SerialTxDone,
            rx_done: Event::SerialRxDone,
        }
    }
}

struct TxPayload {
    state: TxState,
    buf: Vec<u8, TX_CAPACITY>,
    index: usize,
}

struct RxPayload {
    state: RxState,
    buf: RxFrame,
    overflowed: bool,
    frame: Option<RxFrame>,
    overflows: u32,
}

pub struct Leuart<S> {
    port: S,
    config: LeuartConfig,
    tx: TxPayload,
    rx: RxPayload,
    tx_busy: bool,
}

impl<S: SerialLine> Leuart<S> {
    pub fn new(port: S, config: LeuartConfig) -> Self {
        Self {
            port,
            config,
            tx: TxPayload {
                state: TxState::Initialize,
                buf: Vec::new(),
                index: 0,
            },
            rx: RxPayload {
                state: RxState::Init,
                buf: Vec::new(),
                overflowed: false,
                frame: None,
                overflows: 0,
            },
            tx_busy: false,
        }
    }

    /// Configure framing, quiesce the transmitter and arm the receiver.
    ///
    /// The receiver holds an [`LEUART_RX_EM`] block from here on.
    pub fn open(&mut self, ctx: &Context) -> Result<()> {
        self.port.configure_frames(self.config.start_frame, self.config.signal_frame);
        self.port.set_tx_level_irq(false);
        self.port.set_loopback(false);
        self.port.clear_pending();

        self.tx.state = TxState::Initialize;
        self.tx_busy = false;

        if self.rx.state == RxState::Init {
            ctx.power.block(LEUART_RX_EM)?;
        }
        self.rx.buf.clear();
        self.rx.overflowed = false;
        self.rx.frame = None;
        self.rx.state = RxState::Idle;
        self.port.set_rx_block(true);

        info!(
            "leuart: open (start '{}', signal '{}')",
            self.config.start_frame as char, self.config.signal_frame as char
        );
        Ok(())
    }

    /// Begin an interrupt-driven transmit of `text`.
    pub fn start(&mut self, text: &[u8], ctx: &Context) -> Result<()> {
        if self.tx_busy {
            return Err(PreconditionError::TransmitterBusy.into());
        }
        self.tx.buf = Vec::from_slice(text).map_err(|()| ResourceError::PayloadTooLong {
            len: text.len(),
            max: TX_CAPACITY,
        })?;
        self.tx.index = 0;

        if text.is_empty() {
            self.tx.state = TxState::Finish;
            ctx.events.post(self.config.tx_done);
            return Ok(());
        }

        ctx.power.block(LEUART_TX_EM)?;
        self.tx_busy = true;
        self.tx.state = TxState::SendChar;
        self.port.set_tx_level_irq(true);
        debug!("leuart: tx {} bytes", text.len());
        Ok(())
    }

    /// Interrupt entry point.
    pub fn service(&mut self, ctx: &Context) -> Result<()> {
        let pending = self.port.take_pending();

        if pending.contains(SerialIrq::TXBL) {
            self.handle_tx(TxEvent::BufferLevel, ctx)?;
        }
        if pending.contains(SerialIrq::TXC) {
            self.handle_tx(TxEvent::Complete, ctx)?;
        }

        if pending.contains(SerialIrq::STARTF) {
            let byte = self.port.read_byte();
            self.handle_rx(RxEvent::StartFrame, byte, ctx)?;
        } else if pending.contains(SerialIrq::RXDATAV) {
            let byte = self.port.read_byte();
            self.handle_rx(RxEvent::Data, byte, ctx)?;
        }
        if pending.contains(SerialIrq::SIGF) {
            self.handle_rx(RxEvent::Signal, 0, ctx)?;
        }
        Ok(())
    }

    fn handle_tx(&mut self, event: TxEvent, ctx: &Context) -> Result<()> {
        let remaining = self.tx.buf.len().saturating_sub(self.tx.index);
        let (next, action) = tx_transition(self.tx.state, event, remaining)?;
        self.tx.state = next;

        match action {
            TxAction::SendByte => self.send_next(),
            TxAction::SendLastByte => {
                self.send_next();
                self.port.set_tx_level_irq(false);
            }
            TxAction::Complete => {
                self.tx_busy = false;
                ctx.power.unblock(LEUART_TX_EM)?;
                ctx.events.post(self.config.tx_done);
            }
        }
        Ok(())
    }

    fn send_next(&mut self) {
        if let Some(&byte) = self.tx.buf.get(self.tx.index) {
            self.port.write_byte(byte);
            self.tx.index += 1;
        }
    }

    fn handle_rx(&mut self, event: RxEvent, byte: u8, ctx: &Context) -> Result<()> {
        let (next, action) = rx_transition(self.rx.state, event)?;
        let previous = self.rx.state;
        self.rx.state = next;

        match action {
            RxAction::BeginFrame => {
                if matches!(previous, RxState::Started | RxState::Receiving) {
                    debug!("leuart: start byte mid-frame, restarting");
                }
                self.port.set_rx_block(false);
                self.rx.buf.clear();
                self.rx.overflowed = false;
                // capacity is never zero, so the start byte always fits
                let _ = self.rx.buf.push(byte);
            }
            RxAction::Store => {
                if self.rx.buf.push(byte).is_err() {
                    self.rx.overflowed = true;
                }
            }
            RxAction::EndFrame => {
                if self.rx.overflowed {
                    self.rx.overflows += 1;
                    warn!("leuart: frame exceeded {} bytes, discarded", RX_CAPACITY);
                } else {
                    self.rx.frame = Some(self.rx.buf.clone());
                    ctx.events.post(self.config.rx_done);
                }
                self.rx.buf.clear();
                self.rx.overflowed = false;
                self.port.set_rx_block(true);
            }
        }
        Ok(())
    }

    // ── Polled I/O (self-tests) ──────────────────────────────

    /// Transmit `bytes` by polling the buffer-level flag.
    pub fn write_polled(&mut self, bytes: &[u8], spin_limit: u32) -> Result<()> {
        if self.tx_busy {
            return Err(PreconditionError::TransmitterBusy.into());
        }
        for &byte in bytes {
            let mut spins = 0;
            while !self.port.tx_ready() {
                spins += 1;
                if spins >= spin_limit {
                    return Err(Error::Timeout("leuart TXBL"));
                }
            }
            self.port.write_byte(byte);
        }
        Ok(())
    }

    /// Receive one byte by polling the data-valid flag.
    pub fn read_polled(&mut self, spin_limit: u32) -> Result<u8> {
        let mut spins = 0;
        while !self.port.rx_ready() {
            spins += 1;
            if spins >= spin_limit {
                return Err(Error::Timeout("leuart RXDATAV"));
            }
        }
        Ok(self.port.read_byte())
    }

    /// Run the interrupt handler until `done` holds.
    pub fn service_until(
        &mut self,
        ctx: &Context,
        spin_limit: u32,
        done: impl Fn(&Self) -> bool,
    ) -> Result<()> {
        let mut spins = 0;
        while !done(self) {
            self.service(ctx)?;
            spins += 1;
            if spins >= spin_limit {
                return Err(Error::Timeout("leuart service"));
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_tx_busy(&self) -> bool {
        self.tx_busy
    }

    /// A frame has started but its end marker has not arrived.
    pub fn is_rx_busy(&self) -> bool {
        matches!(self.rx.state, RxState::Started | RxState::Receiving)
    }

    pub fn tx_state(&self) -> TxState {
        self.tx.state
    }

    pub fn rx_state(&self) -> RxState {
        self.rx.state
    }

    /// Bytes captured so far in the frame being received.
    pub fn rx_partial(&self) -> &[u8] {
        &self.rx.buf
    }

    /// Take the last completed frame.
    pub fn take_frame(&mut self) -> Option<RxFrame> {
        self.rx.frame.take()
    }

    pub fn rx_overflows(&self) -> u32 {
        self.rx.overflows
    }

    pub fn set_loopback(&mut self, enabled: bool) {
        self.port.set_loopback(enabled);
    }

    pub fn port(&self) -> &S {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }
}
