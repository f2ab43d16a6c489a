//! Application core.
//!
//! Event dispatch and the unit-command protocol.  All interaction with
//! hardware happens through **port traits** defined in [`ports`].

pub mod commands;
pub mod ports;
pub mod service;
