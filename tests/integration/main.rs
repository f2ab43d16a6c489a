//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulated peripherals.  All tests run on the host with no
//! real hardware required.

mod app_service_tests;
mod link_tests;
mod mock_hw;
