//! Transport adapters.
//!
//! A [`Transport`] moves raw protocol text to and from the device. The engine
//! never sees a serial port directly, so the same suites run against a real
//! WolkSensor ([`serial::SerialTransport`]) and the in-memory
//! [`simulated::SimulatedDevice`].

use crate::error::AppResult;
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
/// Hardware link over a USB serial bridge.
pub mod serial;
/// In-memory device.
pub mod simulated;

/// Blocking, line-oriented access to the device.
pub trait Transport {
    /// Writes one command string (already `;`-terminated) to the wire.
    fn send(&mut self, text: &str) -> AppResult<()>;

    /// Blocks until a complete reply arrived or `timeout` elapsed.
    ///
    /// Returns the accumulated text, which is empty when nothing arrived.
    fn receive_timeout(&mut self, timeout: Duration) -> AppResult<String>;

    /// Default wait used by [`Transport::receive`].
    fn read_timeout(&self) -> Duration;

    /// Delay between a send and the first read.
    fn settle(&self) -> Duration {
        Duration::ZERO
    }

    /// Human-readable endpoint for logs.
    fn describe(&self) -> String;

    /// Waits up to [`Transport::read_timeout`].
    fn receive(&mut self) -> AppResult<String> {
        let timeout = self.read_timeout();
        self.receive_timeout(timeout)
    }

    /// Send, then give the device its settle time before the caller reads.
    fn send_and_wait(&mut self, text: &str) -> AppResult<()> {
        self.send(text)?;
        let settle = self.settle();
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        Ok(())
    }

    /// One full exchange: send, settle, receive.
    fn exchange(&mut self, text: &str) -> AppResult<String> {
        self.send_and_wait(text)?;
        self.receive()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, text: &str) -> AppResult<()> {
        (**self).send(text)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> AppResult<String> {
        (**self).receive_timeout(timeout)
    }

    fn read_timeout(&self) -> Duration {
        (**self).read_timeout()
    }

    fn settle(&self) -> Duration {
        (**self).settle()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Direction of a logged exchange.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Direction {
    Sent,
    Received,
}

/// Logs one side of an exchange, at debug when echo is on and trace otherwise.
pub(crate) fn echo(enabled: bool, endpoint: &str, direction: Direction, text: &str) {
    let text = text.escape_default().to_string();
    match (enabled, direction) {
        (true, Direction::Sent) => tracing::debug!(endpoint, "--> {}", text),
        (true, Direction::Received) => tracing::debug!(endpoint, "<-- {}", text),
        (false, Direction::Sent) => tracing::trace!(endpoint, "--> {}", text),
        (false, Direction::Received) => tracing::trace!(endpoint, "<-- {}", text),
    }
}
