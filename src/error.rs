//! Custom error types for the harness.
//!
//! `HarnessError` is the single error type for the crate. It only carries
//! conditions that abort a run:
//!
//! - **Configuration**: the config file could not be loaded (`Config`) or holds
//!   values that parse but make no sense (`Configuration`).
//! - **Transport**: the serial port is missing, busy, or closed under us
//!   (`Io`, `Serial`, `SerialPortNotConnected`, `SerialUnexpectedEof`,
//!   `PortUnavailable`, `SerialFeatureDisabled`).
//! - **Timeout**: a bounded poll ran out of attempts (`DeviceUnresponsive`).
//! - **Protocol**: a reply that could not be decoded where one was required.
//!
//! Assertion failures are not errors. A value mismatch is reported as
//! `Ok(false)` from the engine and logged, so a run surfaces every discrepancy
//! instead of stopping at the first one.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the harness error type.
pub type AppResult<T> = std::result::Result<T, HarnessError>;

/// Conditions that abort a run.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The config file or environment could not be merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A loaded value is out of range or inconsistent.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Operating system I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the serial port driver.
    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A read or write on a port that was already closed.
    #[error("Serial port not connected")]
    SerialPortNotConnected,

    /// The port closed mid-read.
    #[error("Unexpected EOF from serial port")]
    SerialUnexpectedEof,

    /// The binary was built without the serial feature.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// The port is missing, unplugged or stayed busy.
    #[error("Serial port '{0}' is unavailable")]
    PortUnavailable(String),

    /// A bounded wait ran out of attempts.
    #[error("Device unresponsive: gave up waiting for {waited_for} after {attempts} attempts ({elapsed:?})")]
    DeviceUnresponsive {
        /// What the wait expected, e.g. `STATUS IDLE`.
        waited_for: String,
        /// Probes made.
        attempts: u32,
        /// Wall time spent.
        elapsed: Duration,
    },

    /// A reply that had to be decoded could not be.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<figment::Error> for HarnessError {
    fn from(value: figment::Error) -> Self {
        HarnessError::Config(Box::new(value))
    }
}

impl HarnessError {
    /// Whether the error came from the transport rather than the device's behaviour.
    pub fn is_transport(&self) -> bool {
        match self {
            HarnessError::Io(_)
            | HarnessError::SerialPortNotConnected
            | HarnessError::SerialUnexpectedEof
            | HarnessError::SerialFeatureDisabled
            | HarnessError::PortUnavailable(_) => true,
            #[cfg(feature = "instrument_serial")]
            HarnessError::Serial(_) => true,
            _ => false,
        }
    }

    /// Whether the error is a bounded wait that ran out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::DeviceUnresponsive { .. })
    }
}
