//! Interrupt-shared firmware context.
//!
//! The event set and the energy-mode table are the only state touched by
//! both interrupt handlers and the main loop.  Both guard their interior
//! with `critical_section`, so a `Context` can sit in a `static` and be
//! handed to every driver by shared reference:
//!
//! ```ignore
//! static CONTEXT: Context = Context::new();
//! ```

use crate::events::EventSet;
use crate::power::PowerManager;

pub struct Context {
    pub events: EventSet,
    pub power: PowerManager,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            events: EventSet::new(),
            power: PowerManager::new(),
        }
    }

    /// Boot-time reset of both tables.
    pub fn open(&self) {
        self.events.reset();
        self.power.open();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
