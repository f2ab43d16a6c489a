//! HM-10 radio link over the LEUART.
//!
//! Application writes are framed into a [`FrameRing`] and drained one
//! frame per transmission: `write` pushes and tries to pop; every
//! TX-done event calls `pump` to start the next frame.
//!
//! ```text
//!  write("A") ─▶ ┌──────────┐  pop (tx idle)  ┌────────┐
//!  write("B") ─▶ │FrameRing │ ───────────────▶│ LEUART │──▶ radio
//!                └──────────┘ ◀── TX done ────└────────┘
//! ```

pub mod circular;
pub mod hm10;

use log::debug;

use crate::app::ports::SerialLine;
use crate::context::Context;
use crate::drivers::leuart::{Leuart, LeuartConfig, RxFrame};
use crate::error::Result;

use circular::{FrameRing, FrameSink, PopOutcome};

pub const RING_CAPACITY: usize = 64;

/// Feeds popped frames into the LEUART transmitter.
pub struct TxSink<'a, S> {
    leuart: &'a mut Leuart<S>,
    ctx: &'a Context,
}

impl<S: SerialLine> FrameSink for TxSink<'_, S> {
    fn is_busy(&self) -> bool {
        self.leuart.is_tx_busy()
    }

    fn accept(&mut self, frame: &[u8]) -> Result<()> {
        self.leuart.start(frame, self.ctx)
    }
}

pub struct Ble<S> {
    leuart: Leuart<S>,
    ring: FrameRing<RING_CAPACITY>,
}

impl<S: SerialLine> Ble<S> {
    pub fn new(port: S, config: LeuartConfig) -> Self {
        Self {
            leuart: Leuart::new(port, config),
            ring: FrameRing::new(),
        }
    }

    pub fn open(&mut self, ctx: &Context) -> Result<()> {
        self.leuart.open(ctx)?;
        self.ring.init();
        Ok(())
    }

    /// Queue `text` and start sending if the transmitter is idle.
    pub fn write(&mut self, text: &[u8], ctx: &Context) -> Result<PopOutcome> {
        self.ring.push(text)?;
        self.pump(ctx)
    }

    /// Start the next queued frame if the transmitter is idle.
    pub fn pump(&mut self, ctx: &Context) -> Result<PopOutcome> {
        let mut sink = TxSink {
            leuart: &mut self.leuart,
            ctx,
        };
        let outcome = self.ring.pop(&mut sink)?;
        if outcome == PopOutcome::Popped {
            debug!("ble: frame started, {} queued", self.ring.frames());
        }
        Ok(outcome)
    }

    /// Interrupt entry point.
    pub fn service(&mut self, ctx: &Context) -> Result<()> {
        self.leuart.service(ctx)
    }

    pub fn take_frame(&mut self) -> Option<RxFrame> {
        self.leuart.take_frame()
    }

    pub fn leuart(&self) -> &Leuart<S> {
        &self.leuart
    }

    pub fn leuart_mut(&mut self) -> &mut Leuart<S> {
        &mut self.leuart
    }

    pub fn ring(&self) -> &FrameRing<RING_CAPACITY> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut FrameRing<RING_CAPACITY> {
        &mut self.ring
    }
}
