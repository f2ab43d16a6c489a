//! Interrupt-driven two-wire transaction machine.
//!
//! Performs the "measure, then read two bytes" exchange used by
//! no-hold-master sensors:
//!
//! ```text
//!  S ADDR+W  A  CMD  A  Sr ADDR+R  N ... Sr ADDR+R  A  MSB  A  LSB  N  P
//!  └─start─┘    └SendMeasure┘ └SendRead┘ └── WaitAck3 ──┘ GetMsb GetLsbStop End
//! ```
//!
//! | State        | ACK                     | NACK            | RXDATAV              | MSTOP            |
//! |--------------|-------------------------|-----------------|----------------------|------------------|
//! | `SendMeasure`| write command           | fault           | fault                | fault            |
//! | `SendRead`   | Sr + address/read       | fault           | fault                | fault            |
//! | `WaitAck3`   | wait for data           | Sr + retry      | fault                | fault            |
//! | `GetMsb`     | fault                   | fault           | store MSB, ACK       | fault            |
//! | `GetLsbStop` | fault                   | fault           | store LSB, NACK+STOP | fault            |
//! | `End`        | fault                   | fault           | fault                | unblock, post    |
//!
//! While a transaction is in flight the driver blocks [`I2C_EM_BLOCK`]:
//! the bus clock does not run below EM1.

use log::{debug, info, warn};

use crate::app::ports::{TwoWireBus, TwoWireIrq};
use crate::context::Context;
use crate::error::{Peripheral, PreconditionError, ProtocolViolation, ResourceError, Result};
use crate::events::Event;
use crate::power::EnergyMode;

/// Shallowest depth the bus cannot operate in.
pub const I2C_EM_BLOCK: EnergyMode = EnergyMode::Em2;

/// Default bound on consecutive read-address NACKs.
pub const DEFAULT_RETRY_LIMIT: u32 = 1024;

const WRITE: u8 = 0;
const READ: u8 = 1;

const fn address_byte(address: u8, rw: u8) -> u8 {
    (address << 1) | rw
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cState {
    Init,
    SendMeasure,
    SendRead,
    WaitAck3,
    GetMsb,
    GetLsbStop,
    End,
}

impl I2cState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::SendMeasure => "SendMeasure",
            Self::SendRead => "SendRead",
            Self::WaitAck3 => "WaitAck3",
            Self::GetMsb => "GetMsb",
            Self::GetLsbStop => "GetLsbStop",
            Self::End => "End",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cEvent {
    Ack,
    Nack,
    DataValid,
    Stop,
}

impl I2cEvent {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::DataValid => "RXDATAV",
            Self::Stop => "MSTOP",
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cAction {
    WriteCommand,
    RequestRead,
    RetryRead,
    AwaitData,
    StoreMsb,
    StoreLsb,
    Complete,
}

/// The transition table.
pub fn transition(
    state: I2cState,
    event: I2cEvent,
) -> core::result::Result<(I2cState, I2cAction), ProtocolViolation> {
    use I2cEvent::{Ack, DataValid, Nack, Stop};
    use I2cState::{End, GetLsbStop, GetMsb, SendMeasure, SendRead, WaitAck3};

    match (state, event) {
        (SendMeasure, Ack) => Ok((SendRead, I2cAction::WriteCommand)),
        (SendRead, Ack) => Ok((WaitAck3, I2cAction::RequestRead)),
        (WaitAck3, Ack) => Ok((GetMsb, I2cAction::AwaitData)),
        (WaitAck3, Nack) => Ok((WaitAck3, I2cAction::RetryRead)),
        (GetMsb, DataValid) => Ok((GetLsbStop, I2cAction::StoreMsb)),
        (GetLsbStop, DataValid) => Ok((End, I2cAction::StoreLsb)),
        (End, Stop) => Ok((I2cState::Init, I2cAction::Complete)),
        (state, event) => Err(ProtocolViolation {
            peripheral: Peripheral::TwoWire,
            state: state.name(),
            event: event.name(),
        }),
    }
}

/// One sensor transaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub address: u8,
    pub command: u8,
    pub read: bool,
    pub len: u8,
}

impl Transfer {
    pub const fn read(address: u8, command: u8, len: u8) -> Self {
        Self { address, command, read: true, len }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cConfig {
    /// Consecutive WaitAck3 NACKs tolerated; `None` retries forever.
    pub retry_limit: Option<u32>,
    pub done_event: Event,
    pub fault_event: Event,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            retry_limit: Some(DEFAULT_RETRY_LIMIT),
            done_event: Event::SensorReadDone,
            fault_event: Event::SensorFault,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Complete(u32),
    Aborted { attempts: u32 },
}

pub struct I2c<B> {
    bus: B,
    config: I2cConfig,
    state: I2cState,
    address: u8,
    command: u8,
    result: u32,
    retries: u32,
    outcome: Option<Outcome>,
}

impl<B: TwoWireBus> I2c<B> {
    pub fn new(bus: B, config: I2cConfig) -> Self {
        Self {
            bus,
            config,
            state: I2cState::Init,
            address: 0,
            command: 0,
            result: 0,
            retries: 0,
            outcome: None,
        }
    }

    /// Recover the bus and reset the machine.
    pub fn open(&mut self) {
        self.bus.reset_bus();
        self.state = I2cState::Init;
        self.outcome = None;
        info!("i2c: open (retry limit {:?})", self.config.retry_limit);
    }

    /// Begin a transaction.  Completion is reported through the configured
    /// done event; collect the value with [`take_result`](Self::take_result).
    pub fn start(&mut self, transfer: Transfer, ctx: &Context) -> Result<()> {
        if self.is_busy() || !self.bus.is_idle() {
            return Err(PreconditionError::BusBusy.into());
        }
        if !transfer.read || transfer.len != 2 {
            return Err(PreconditionError::UnsupportedTransfer.into());
        }
        ctx.power.block(I2C_EM_BLOCK)?;

        self.address = transfer.address;
        self.command = transfer.command;
        self.result = 0;
        self.retries = 0;
        self.outcome = None;
        self.state = I2cState::SendMeasure;

        self.bus.start();
        self.bus.write(address_byte(transfer.address, WRITE));
        debug!("i2c: start addr=0x{:02X} cmd=0x{:02X}", transfer.address, transfer.command);
        Ok(())
    }

    /// Interrupt entry point.
    pub fn service(&mut self, ctx: &Context) -> Result<()> {
        let pending = self.bus.take_pending();
        if pending.contains(TwoWireIrq::ACK) {
            self.handle(I2cEvent::Ack, ctx)?;
        }
        if pending.contains(TwoWireIrq::NACK) {
            self.handle(I2cEvent::Nack, ctx)?;
        }
        if pending.contains(TwoWireIrq::RXDATAV) {
            self.handle(I2cEvent::DataValid, ctx)?;
        }
        if pending.contains(TwoWireIrq::MSTOP) {
            self.handle(I2cEvent::Stop, ctx)?;
        }
        Ok(())
    }

    /// Feed one bus event through the machine.
    pub fn handle(&mut self, event: I2cEvent, ctx: &Context) -> Result<()> {
        let (next, action) = transition(self.state, event)?;
        self.state = next;

        match action {
            I2cAction::WriteCommand => self.bus.write(self.command),
            I2cAction::RequestRead => self.request_read(),
            I2cAction::RetryRead => {
                self.retries = self.retries.saturating_add(1);
                match self.config.retry_limit {
                    Some(limit) if self.retries >= limit => return self.abort(ctx),
                    _ => self.request_read(),
                }
            }
            I2cAction::AwaitData => {}
            I2cAction::StoreMsb => {
                self.result = u32::from(self.bus.read()) << 8;
                self.bus.ack();
            }
            I2cAction::StoreLsb => {
                self.result |= u32::from(self.bus.read());
                self.bus.nack();
                self.bus.stop();
            }
            I2cAction::Complete => {
                ctx.power.unblock(I2C_EM_BLOCK)?;
                self.outcome = Some(Outcome::Complete(self.result));
                ctx.events.post(self.config.done_event);
                debug!("i2c: done result=0x{:04X} after {} retries", self.result, self.retries);
            }
        }
        Ok(())
    }

    fn request_read(&mut self) {
        self.bus.start();
        self.bus.write(address_byte(self.address, READ));
    }

    fn abort(&mut self, ctx: &Context) -> Result<()> {
        self.bus.abort();
        self.state = I2cState::Init;
        self.outcome = Some(Outcome::Aborted { attempts: self.retries });
        ctx.power.unblock(I2C_EM_BLOCK)?;
        ctx.events.post(self.config.fault_event);
        warn!("i2c: addr 0x{:02X} NACKed {} read requests, aborted", self.address, self.retries);
        Ok(())
    }

    /// Collect the outcome of the last finished transaction.
    pub fn take_result(&mut self) -> Result<u32> {
        match self.outcome.take() {
            Some(Outcome::Complete(value)) => Ok(value),
            Some(Outcome::Aborted { attempts }) => Err(ResourceError::RetryLimit { attempts }.into()),
            None => Err(PreconditionError::NoResult.into()),
        }
    }

    pub fn state(&self) -> I2cState {
        self.state
    }

    /// A transaction is in flight, including `End` while MSTOP is pending.
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, I2cState::Init)
    }

    /// NACK retries seen by the current (or last) transaction.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
