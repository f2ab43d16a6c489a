//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter | Implements                                   | Connects to            |
//! |---------|----------------------------------------------|------------------------|
//! | `sim`   | TwoWireBus, SerialLine, TimerPort,           | In-memory peripheral   |
//! |         | SleepControl, `embedded_hal` OutputPin       | models                 |

pub mod sim;
