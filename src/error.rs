//! Unified error types for the ThermoBeacon firmware.
//!
//! A single `Error` enum that every subsystem converts into, split by how
//! the caller is expected to react:
//!
//! | Class          | Example                                  | Reaction          |
//! |----------------|------------------------------------------|-------------------|
//! | `Protocol`     | NACK while not waiting on a read address | fatal, halt       |
//! | `Resource`     | ring buffer full, NACK retry limit       | drop data / skip  |
//! | `Precondition` | transaction started while bus is busy    | caller decides    |
//!
//! All variants are `Copy` so they can be returned from interrupt service
//! paths without allocation.

use core::fmt;

use crate::power::EnergyMode;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An interrupt arrived in a state that cannot accept it.
    Protocol(ProtocolViolation),
    /// A bounded resource ran out.
    Resource(ResourceError),
    /// An operation was requested in the wrong state.
    Precondition(PreconditionError),
    /// GPIO write failed.
    Gpio,
    /// Configuration is invalid.
    Config(&'static str),
    /// A bounded polling loop ran out of attempts.
    Timeout(&'static str),
    /// A boot self-test did not observe the expected behaviour.
    SelfTest {
        test: &'static str,
        step: &'static str,
    },
}

impl Error {
    /// Whether the error indicates a broken hardware/logic invariant.
    ///
    /// Fatal errors halt the firmware; everything else is handled by
    /// the application (drop, skip, or retry later).
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::SelfTest { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Resource(e) => write!(f, "resource: {e}"),
            Self::Precondition(e) => write!(f, "precondition: {e}"),
            Self::Gpio => write!(f, "GPIO write failed"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Timeout(what) => write!(f, "timed out waiting for {what}"),
            Self::SelfTest { test, step } => write!(f, "self-test {test} failed at {step}"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Protocol violations
// ---------------------------------------------------------------------------

/// Interrupt-driven peripheral that detected the violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    TwoWire,
    SerialTx,
    SerialRx,
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoWire => write!(f, "i2c"),
            Self::SerialTx => write!(f, "leuart tx"),
            Self::SerialRx => write!(f, "leuart rx"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolViolation {
    pub peripheral: Peripheral,
    pub state: &'static str,
    pub event: &'static str,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: unexpected {} in {}", self.peripheral, self.event, self.state)
    }
}

impl From<ProtocolViolation> for Error {
    fn from(e: ProtocolViolation) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Resource exhaustion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// Framed push needs more bytes than the ring has free.
    RingFull { needed: usize, available: usize },
    /// Payload cannot be described by a one-byte frame header.
    FrameTooLong { len: usize, max: usize },
    /// Payload does not fit the serial transmit buffer.
    PayloadTooLong { len: usize, max: usize },
    /// Another block on this depth would reach the sanity ceiling.
    BlockCeiling(EnergyMode),
    /// The sensor kept NACKing its read address.
    RetryLimit { attempts: u32 },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingFull { needed, available } => {
                write!(f, "ring full ({needed} needed, {available} free)")
            }
            Self::FrameTooLong { len, max } => write!(f, "frame of {len} bytes exceeds {max}"),
            Self::PayloadTooLong { len, max } => {
                write!(f, "payload of {len} bytes exceeds {max}")
            }
            Self::BlockCeiling(mode) => write!(f, "{mode} block count at ceiling"),
            Self::RetryLimit { attempts } => write!(f, "gave up after {attempts} NACKs"),
        }
    }
}

impl From<ResourceError> for Error {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}

// ---------------------------------------------------------------------------
// Precondition violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    /// Two-wire transaction requested while one is in flight.
    BusBusy,
    /// Serial transmit requested while one is in flight.
    TransmitterBusy,
    /// Unblock without a matching block.
    NotBlocked(EnergyMode),
    /// No completed transaction to collect.
    NoResult,
    /// The transaction machine only performs two-byte reads.
    UnsupportedTransfer,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusBusy => write!(f, "two-wire bus busy"),
            Self::TransmitterBusy => write!(f, "transmitter busy"),
            Self::NotBlocked(mode) => write!(f, "{mode} is not blocked"),
            Self::NoResult => write!(f, "no completed transaction"),
            Self::UnsupportedTransfer => write!(f, "unsupported transfer shape"),
        }
    }
}

impl From<PreconditionError> for Error {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}
