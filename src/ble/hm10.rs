//! HM-10 AT command self-test.
//!
//! | Command          | Response          |
//! |------------------|-------------------|
//! | `AT`             | `OK`              |
//! | `AT+NAME<name>`  | `OK+Set:<name>`   |
//! | `AT+RESET`       | `OK+RESET`        |
//!
//! Runs with polled I/O before interrupts are in use.  The module only
//! answers AT commands while no central is connected.

use core::fmt::Write;

use heapless::String;
use log::info;

use crate::app::ports::SerialLine;
use crate::drivers::leuart::Leuart;
use crate::error::{Error, PreconditionError, Result};

/// HM-10 names are at most 12 characters.
pub const MAX_NAME_LEN: usize = 12;

const TEST: &str = "hm10";

/// Rename the radio and reset it, checking every response.
pub fn at_self_test<S: SerialLine>(leuart: &mut Leuart<S>, name: &str, spin_limit: u32) -> Result<()> {
    if leuart.is_tx_busy() {
        return Err(PreconditionError::TransmitterBusy.into());
    }
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::Config("radio name must be 1-12 characters"));
    }

    let was_blocked = leuart.port().rx_blocked();
    leuart.port_mut().set_rx_block(false);

    let result = rename(leuart, name, spin_limit);

    // restored on failure too
    leuart.port_mut().set_rx_block(was_blocked);
    leuart.port_mut().clear_pending();
    result?;
    info!("hm10: radio renamed to '{}'", name);
    Ok(())
}

fn rename<S: SerialLine>(leuart: &mut Leuart<S>, name: &str, spin_limit: u32) -> Result<()> {
    exchange(leuart, b"AT", b"OK", "AT", spin_limit)?;

    let mut command: String<32> = String::new();
    let mut expected: String<32> = String::new();
    write!(command, "AT+NAME{name}").map_err(|_| Error::Config("radio name too long"))?;
    write!(expected, "OK+Set:{name}").map_err(|_| Error::Config("radio name too long"))?;
    exchange(leuart, command.as_bytes(), expected.as_bytes(), "AT+NAME", spin_limit)?;

    exchange(leuart, b"AT+RESET", b"OK+RESET", "AT+RESET", spin_limit)
}

fn exchange<S: SerialLine>(
    leuart: &mut Leuart<S>,
    command: &[u8],
    expected: &[u8],
    step: &'static str,
    spin_limit: u32,
) -> Result<()> {
    let fail = Error::SelfTest { test: TEST, step };
    leuart.write_polled(command, spin_limit).map_err(|_| fail)?;
    for &want in expected {
        let got = leuart.read_polled(spin_limit).map_err(|_| fail)?;
        if got != want {
            return Err(fail);
        }
    }
    Ok(())
}
