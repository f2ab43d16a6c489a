//! Framed single-producer/single-consumer byte ring.
//!
//! Each frame is stored as a one-byte header (payload length + 1)
//! followed by the payload:
//!
//! ```text
//!   read                      write
//!    ▼                          ▼
//!  ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┬ ─ ─
//!  │ 6 │ H │ e │ l │ l │ o │ 4 │ B │ y │ e │
//!  └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┴ ─ ─
//! ```
//!
//! Capacity is a power of two so cursors wrap with a mask; one byte is
//! kept free to tell full from empty.  Both cursors are touched only from
//! the main loop.

use heapless::Vec;

use crate::error::{ResourceError, Result};

/// Downstream consumer of popped frames.
pub trait FrameSink {
    /// A previous frame is still being delivered.
    fn is_busy(&self) -> bool;

    /// Take ownership of one frame.
    fn accept(&mut self, frame: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOutcome {
    /// Nothing queued.
    Empty,
    /// The sink is busy; nothing was consumed.
    NotReady,
    /// One frame was handed to the sink.
    Popped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRing<const N: usize> {
    buf: [u8; N],
    write: usize,
    read: usize,
}

impl<const N: usize> FrameRing<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two() && N >= 4, "ring capacity must be a power of two >= 4");
        N - 1
    };

    /// Largest payload a single frame can carry.
    pub const MAX_PAYLOAD: usize = if N - 2 < 254 { N - 2 } else { 254 };

    pub const fn new() -> Self {
        let _ = Self::MASK;
        Self {
            buf: [0; N],
            write: 0,
            read: 0,
        }
    }

    /// Drop every queued frame.
    pub fn init(&mut self) {
        self.write = 0;
        self.read = 0;
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes occupied by queued frames (headers included).
    pub fn used(&self) -> usize {
        self.write.wrapping_sub(self.read) & Self::MASK
    }

    pub fn space_available(&self) -> usize {
        N - self.used() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.write == self.read
    }

    /// Number of complete frames queued.
    pub fn frames(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.read;
        while cursor != self.write {
            cursor = (cursor + usize::from(self.buf[cursor])) & Self::MASK;
            count += 1;
        }
        count
    }

    /// Append one frame.  Nothing is written unless the whole frame fits.
    pub fn push(&mut self, payload: &[u8]) -> Result<()> {
        let len = payload.len();
        if len > Self::MAX_PAYLOAD {
            return Err(ResourceError::FrameTooLong {
                len,
                max: Self::MAX_PAYLOAD,
            }
            .into());
        }
        let available = self.space_available();
        if available < len + 1 {
            return Err(ResourceError::RingFull {
                needed: len + 1,
                available,
            }
            .into());
        }

        self.put(len as u8 + 1);
        for &byte in payload {
            self.put(byte);
        }
        Ok(())
    }

    /// Hand the oldest frame to `sink` if it can take it.
    ///
    /// The frame stays queued when the sink rejects it.
    pub fn pop(&mut self, sink: &mut impl FrameSink) -> Result<PopOutcome> {
        if self.is_empty() {
            return Ok(PopOutcome::Empty);
        }
        if sink.is_busy() {
            return Ok(PopOutcome::NotReady);
        }

        let header = usize::from(self.buf[self.read]);
        let len = header.saturating_sub(1);
        let mut scratch: Vec<u8, N> = Vec::new();
        for i in 1..=len {
            // push() bounds every frame to MAX_PAYLOAD < N
            let _ = scratch.push(self.buf[(self.read + i) & Self::MASK]);
        }
        sink.accept(&scratch)?;
        self.read = (self.read + len + 1) & Self::MASK;
        Ok(PopOutcome::Popped)
    }

    fn put(&mut self, byte: u8) {
        self.buf[self.write] = byte;
        self.write = (self.write + 1) & Self::MASK;
    }
}

impl<const N: usize> Default for FrameRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that keeps the last popped frame for inspection.
#[derive(Debug, Default)]
pub struct Capture<const N: usize> {
    pub frame: Vec<u8, N>,
    pub busy: bool,
}

impl<const N: usize> FrameSink for Capture<N> {
    fn is_busy(&self) -> bool {
        self.busy
    }

    fn accept(&mut self, frame: &[u8]) -> Result<()> {
        self.frame = Vec::from_slice(frame).map_err(|()| ResourceError::FrameTooLong {
            len: frame.len(),
            max: N,
        })?;
        Ok(())
    }
}
