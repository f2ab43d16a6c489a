//! Energy-mode arbitration.
//!
//! Every peripheral that cannot survive a given sleep depth raises a block
//! on that depth while it is busy and releases it when done.  The idle
//! loop asks the arbiter for the deepest depth nobody objects to.
//!
//! ```text
//!   EM0   EM1   EM2   EM3   EM4        counts
//!  ┌────┬─────┬─────┬─────┬─────┐
//!  │ 0  │  0  │  1  │  2  │  0  │   ← i2c holds EM2, leuart tx+rx hold EM3
//!  └────┴─────┴─────┴─────┴─────┘
//!               ▲
//!            floor = EM2  ─▶  sleep in EM1
//! ```
//!
//! The block table lives behind a `critical_section::Mutex`, so a single
//! `PowerManager` can be shared by reference between interrupt handlers
//! and the main loop.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::app::ports::SleepControl;
use crate::error::{PreconditionError, ResourceError, Result};

/// Processor sleep depths, shallowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnergyMode {
    Em0 = 0,
    Em1 = 1,
    Em2 = 2,
    Em3 = 3,
    Em4 = 4,
}

impl EnergyMode {
    pub const COUNT: usize = 5;
    pub const ALL: [Self; Self::COUNT] = [Self::Em0, Self::Em1, Self::Em2, Self::Em3, Self::Em4];
    pub const DEEPEST: Self = Self::Em4;

    pub const fn index(self) -> usize {
        self as usize
    }

    /// The next shallower depth, if any.
    pub const fn shallower(self) -> Option<Self> {
        match self {
            Self::Em0 => None,
            Self::Em1 => Some(Self::Em0),
            Self::Em2 => Some(Self::Em1),
            Self::Em3 => Some(Self::Em2),
            Self::Em4 => Some(Self::Em3),
        }
    }
}

impl fmt::Display for EnergyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EM{}", self.index())
    }
}

/// Block counts at or above this value indicate unmatched block calls.
pub const BLOCK_CEILING: u8 = 10;

pub struct PowerManager {
    blocks: Mutex<RefCell<[u8; EnergyMode::COUNT]>>,
}

impl PowerManager {
    pub const fn new() -> Self {
        Self {
            blocks: Mutex::new(RefCell::new([0; EnergyMode::COUNT])),
        }
    }

    /// Clear every block.
    pub fn open(&self) {
        critical_section::with(|cs| {
            *self.blocks.borrow_ref_mut(cs) = [0; EnergyMode::COUNT];
        });
    }

    /// Forbid sleeping in `mode` (and anything deeper).
    pub fn block(&self, mode: EnergyMode) -> Result<()> {
        critical_section::with(|cs| {
            let mut blocks = self.blocks.borrow_ref_mut(cs);
            let count = &mut blocks[mode.index()];
            if *count + 1 >= BLOCK_CEILING {
                return Err(ResourceError::BlockCeiling(mode).into());
            }
            *count += 1;
            Ok(())
        })
    }

    /// Release one block previously raised on `mode`.
    pub fn unblock(&self, mode: EnergyMode) -> Result<()> {
        critical_section::with(|cs| {
            let mut blocks = self.blocks.borrow_ref_mut(cs);
            let count = &mut blocks[mode.index()];
            if *count == 0 {
                return Err(PreconditionError::NotBlocked(mode).into());
            }
            *count -= 1;
            Ok(())
        })
    }

    pub fn block_count(&self, mode: EnergyMode) -> u8 {
        critical_section::with(|cs| self.blocks.borrow_ref(cs)[mode.index()])
    }

    /// Shallowest depth with a nonzero block count, or the deepest depth
    /// when nothing is blocked.
    pub fn current_floor(&self) -> EnergyMode {
        critical_section::with(|cs| {
            let blocks = self.blocks.borrow_ref(cs);
            EnergyMode::ALL
                .into_iter()
                .find(|m| blocks[m.index()] != 0)
                .unwrap_or(EnergyMode::DEEPEST)
        })
    }

    /// Depth the idle loop may enter, `None` when EM0 or EM1 is blocked.
    pub fn sleep_target(&self) -> Option<EnergyMode> {
        match self.current_floor() {
            EnergyMode::Em0 | EnergyMode::Em1 => None,
            floor => floor.shallower(),
        }
    }

    /// Enter the deepest permitted sleep depth through `hw`.
    ///
    /// Returns the depth entered, or `None` if the processor must stay
    /// awake.
    pub fn enter_best_sleep(&self, hw: &mut impl SleepControl) -> Option<EnergyMode> {
        let target = self.sleep_target()?;
        debug!("power: sleeping in {target}");
        hw.enter(target);
        Some(target)
    }
}

impl Default for PowerManager {
    fn default() -> Self {
        Self::new()
    }
}
