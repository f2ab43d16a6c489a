//! ThermoBeacon firmware library.
//!
//! Low-energy temperature beacon: an Si7021 sampled on a timer, readings
//! sent over an HM-10 serial radio, unit commands received back.  All
//! hardware access goes through the port traits in [`app::ports`], so
//! every module is testable on the host with the simulated peripherals
//! in [`adapters::sim`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod ble;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod drivers;
pub mod error;
pub mod events;
pub mod power;
pub mod sensors;
