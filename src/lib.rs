//! # WolkSensor Functional Test Harness
//!
//! This crate drives a WolkSensor over its serial text protocol and checks
//! that the firmware answers the way it should. Commands are `NAME;` queries
//! and `NAME argument;` writes; replies are `;`-terminated tokens.
//!
//! ## Crate Structure
//!
//! - **`transport`**: The `Transport` trait plus two implementations, a
//!   `serialport`-backed link to the device and an in-memory simulated device.
//! - **`protocol`**: Commands, the parameter table, schema-driven reply
//!   decoding and the wanted/unwanted classifier.
//! - **`engine`**: The command/assertion engine (`test`, `protocol_parser`,
//!   idle and connection waits) and its bounded retry policy.
//! - **`suites`**: The data-driven, flow and robustness stages and the
//!   PASS/FAIL roll-up.
//! - **`config`**: Layered configuration with environment profiles.
//! - **`logging`**: `tracing` subscriber setup and the report target.
//! - **`error`**: The crate-wide `HarnessError`.

/// Layered configuration.
pub mod config;
/// Command/assertion engine.
pub mod engine;
/// Crate-wide error type.
pub mod error;
/// Tracing setup and operator report lines.
pub mod logging;
/// Wire format of the sensor's text protocol.
pub mod protocol;
/// Test stages.
pub mod suites;
/// Serial and simulated links to the device.
pub mod transport;
