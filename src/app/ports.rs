//! Port traits: the hexagonal boundary between the protocol machines and
//! the peripheral registers.
//!
//! ```text
//!   Peripheral regs ──▶ Port trait ──▶ Driver FSM ──▶ Context (events, power)
//! ```
//!
//! Register-level adapters (or the simulated peripherals in
//! [`adapters::sim`](crate::adapters::sim)) implement these traits.  The
//! drivers consume them via generics, so every state machine can be
//! driven from host tests with synthetic interrupt sequences.
//!
//! ## Interrupt flags
//!
//! Each port exposes `take_pending()`, the equivalent of reading the
//! masked interrupt-flag register and writing the same bits to the
//! flag-clear register.  A driver's `service()` is what the interrupt
//! vector calls.

use crate::power::EnergyMode;

macro_rules! irq_flags {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(u8);

        impl $name {
            $($(#[$fmeta])* pub const $flag: Self = Self($bit);)+

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(self) -> u8 {
                self.0
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0 && other.0 != 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

// ───────────────────────────────────────────────────────────────
// Two-wire bus (I2C master)
// ───────────────────────────────────────────────────────────────

irq_flags! {
    /// Two-wire master interrupt sources.
    TwoWireIrq {
        /// Slave acknowledged the last byte.
        ACK = 0b0001,
        /// Slave did not acknowledge the last byte.
        NACK = 0b0010,
        /// A received byte is waiting in the data register.
        RXDATAV = 0b0100,
        /// STOP condition completed.
        MSTOP = 0b1000,
    }
}

/// Command and data registers of a two-wire master.
pub trait TwoWireBus {
    /// Bus state machine reports idle.
    fn is_idle(&self) -> bool;

    /// Issue a START (or repeated START) condition.
    fn start(&mut self);

    /// Load a byte into the transmit data register.
    fn write(&mut self, byte: u8);

    /// Read the received data register.
    fn read(&mut self) -> u8;

    /// Acknowledge the byte just received.
    fn ack(&mut self);

    /// Not-acknowledge the byte just received.
    fn nack(&mut self);

    /// Issue a STOP condition.
    fn stop(&mut self);

    /// Abort the current transfer and release the bus.
    fn abort(&mut self);

    /// Free a slave stuck mid-byte: clock SCL until SDA releases, then abort.
    fn reset_bus(&mut self);

    /// Read and clear the pending interrupt flags.
    fn take_pending(&mut self) -> TwoWireIrq;
}

// ───────────────────────────────────────────────────────────────
// Low-energy UART
// ───────────────────────────────────────────────────────────────

irq_flags! {
    /// Low-energy UART interrupt sources.
    SerialIrq {
        /// Transmit buffer has room for another byte.
        TXBL = 0b0_0001,
        /// Transmit shift register and buffer are both empty.
        TXC = 0b0_0010,
        /// Configured start-frame byte detected.
        STARTF = 0b0_0100,
        /// A received byte is waiting in the data register.
        RXDATAV = 0b0_1000,
        /// Configured signal-frame byte detected.
        SIGF = 0b1_0000,
    }
}

/// Registers of a low-energy UART with hardware start/signal framing.
pub trait SerialLine {
    /// Configure the start-frame and signal-frame detector bytes.
    fn configure_frames(&mut self, start: u8, signal: u8);

    /// Load a byte into the transmit buffer.
    fn write_byte(&mut self, byte: u8);

    /// Read the receive data register.
    fn read_byte(&mut self) -> u8;

    /// Polled transmit-buffer-level flag.
    fn tx_ready(&mut self) -> bool;

    /// Polled receive-data-valid flag.
    fn rx_ready(&mut self) -> bool;

    /// Enable or disable the transmit-buffer-level interrupt.
    fn set_tx_level_irq(&mut self, enabled: bool);

    /// Block or unblock reception.  A blocked receiver discards bytes
    /// until the start-frame byte arrives.
    fn set_rx_block(&mut self, blocked: bool);

    fn rx_blocked(&self) -> bool;

    /// Route TX back into RX internally.
    fn set_loopback(&mut self, enabled: bool);

    /// Read and clear the pending interrupt flags.
    fn take_pending(&mut self) -> SerialIrq;

    /// Clear all pending interrupt flags.
    fn clear_pending(&mut self) {
        let _ = self.take_pending();
    }
}

// ───────────────────────────────────────────────────────────────
// Low-energy timer
// ───────────────────────────────────────────────────────────────

irq_flags! {
    /// Low-energy timer interrupt sources.
    TimerIrq {
        COMP0 = 0b001,
        COMP1 = 0b010,
        UF = 0b100,
    }
}

/// Counter, compare registers and run control of a low-energy timer.
pub trait TimerPort {
    /// Load the period (COMP0 top value) and active time (COMP1).
    fn configure(&mut self, top: u32, active: u32);

    fn set_running(&mut self, running: bool);

    /// Read and clear the pending interrupt flags.
    fn take_pending(&mut self) -> TimerIrq;
}

// ───────────────────────────────────────────────────────────────
// Sleep control
// ───────────────────────────────────────────────────────────────

/// Enters a processor sleep depth; returns on the next interrupt.
pub trait SleepControl {
    fn enter(&mut self, mode: EnergyMode);
}
