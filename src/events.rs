//! Scheduled-event set.
//!
//! Events are produced by:
//! - Peripheral drivers (sensor transaction done, serial TX/RX done)
//! - The low-energy timer (compare and underflow interrupts)
//! - Boot (one-shot start-up event)
//!
//! Events are consumed by the main loop, which clears each bit before
//! running its handler.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ I2C ISR     │────▶│              │     │              │
//! │ LEUART ISR  │────▶│  Event Set   │────▶│  Main Loop   │
//! │ LETIMER ISR │────▶│  (bitmask)   │     │  (consumer)  │
//! │ Boot        │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Unlike a queue, repeated posts of the same event collapse into one bit;
//! add and remove are idempotent.

use core::cell::Cell;

use critical_section::Mutex;

/// Scheduled events, one bit each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Event {
    // ── Timer ─────────────────────────────────────────────
    TimerComp0     = 0x01,
    TimerComp1     = 0x02,
    TimerUnderflow = 0x04,

    // ── Sensor ────────────────────────────────────────────
    SensorReadDone = 0x08,

    // ── System ────────────────────────────────────────────
    BootUp         = 0x10,

    // ── Radio link ────────────────────────────────────────
    SerialTxDone   = 0x20,
    SerialRxDone   = 0x40,

    // ── Sensor (abnormal) ─────────────────────────────────
    SensorFault    = 0x80,
}

impl Event {
    pub const fn mask(self) -> u32 {
        self as u32
    }
}

/// Shared bitmask of pending events.
pub struct EventSet {
    pending: Mutex<Cell<u32>>,
}

impl EventSet {
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(Cell::new(0)),
        }
    }

    /// Set every bit in `mask`.
    pub fn add(&self, mask: u32) {
        critical_section::with(|cs| {
            let cell = self.pending.borrow(cs);
            cell.set(cell.get() | mask);
        });
    }

    /// Clear every bit in `mask`.
    pub fn remove(&self, mask: u32) {
        critical_section::with(|cs| {
            let cell = self.pending.borrow(cs);
            cell.set(cell.get() & !mask);
        });
    }

    /// Snapshot of all pending bits.
    pub fn get(&self) -> u32 {
        critical_section::with(|cs| self.pending.borrow(cs).get())
    }

    pub fn post(&self, event: Event) {
        self.add(event.mask());
    }

    pub fn clear(&self, event: Event) {
        self.remove(event.mask());
    }

    pub fn is_pending(&self, event: Event) -> bool {
        self.get() & event.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.get() == 0
    }

    /// Drop everything; boot only.
    pub fn reset(&self) {
        critical_section::with(|cs| self.pending.borrow(cs).set(0));
    }
}

impl Default for EventSet {
    fn default() -> Self {
        Self::new()
    }
}
