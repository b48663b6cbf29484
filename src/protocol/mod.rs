//! WolkSensor text protocol: commands, reply decoding and reply classification.

/// Wanted/unwanted reply classification.
pub mod classify;
/// Commands and the parameter table.
pub mod command;
/// Reply frames, statuses and records.
pub mod response;

pub use classify::{classify, unwanted_response, Unwanted};
pub use command::{Access, Command, Parameter, ValueKind, PARAMETERS};
pub use response::{
    extract_field, DeviceStatus, FieldType, FieldValue, Frame, ReadingsOutcome, Record,
    RecordSchema, READINGS_SCHEMA, SYSTEM_SCHEMA,
};
