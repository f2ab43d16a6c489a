//! Peripheral drivers: interrupt-driven state machines over the port traits.

pub mod hw_timer;
pub mod i2c;
pub mod leuart;
pub mod status_led;
