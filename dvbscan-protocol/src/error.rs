//! Error types shared by the dvbscan crates.

use thiserror::Error;

/// Errors reported by the device tuning controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The hardware is held by another owner.
    #[error("Device is busy")]
    Busy,

    /// The operation is not valid in the current device state.
    #[error("Invalid device state: {0}")]
    InvalidState(&'static str),

    /// The backend rejected the tune command.
    #[error("Tune command rejected by the device")]
    TuneRejected,

    /// The backend could not start delivering a PID (filter table exhausted).
    #[error("PID filter rejected for pid 0x{0:04X}")]
    FilterRejected(u16),

    /// A filter was removed that had never been registered.
    #[error("No such filter registered for pid 0x{0:04X}")]
    NotRegistered(u16),
}

/// Errors raised while decoding PSI/SI sections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PsiError {
    /// Not enough bytes for the section header.
    #[error("Section too short")]
    TooShort,

    /// The section length field does not fit the available data.
    #[error("Invalid section length: {length} (available {available})")]
    BadLength { length: usize, available: usize },

    /// CRC-32 verification failed.
    #[error("CRC-32 mismatch")]
    CrcMismatch,

    /// The section carries an unexpected table id.
    #[error("Unexpected table id: expected 0x{expected:02X}, found 0x{found:02X}")]
    WrongTable { expected: u8, found: u8 },

    /// The section body is structurally invalid.
    #[error("Malformed section: {0}")]
    Malformed(&'static str),
}

/// Errors raised while parsing a scan-file transponder line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransponderParseError {
    /// The line is empty.
    #[error("Empty transponder line")]
    Empty,

    /// The delivery system prefix is not known.
    #[error("Unknown delivery system: {0}")]
    UnknownType(String),

    /// A mandatory field is missing.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field could not be parsed.
    #[error("Invalid value for {field}: {value}")]
    BadValue { field: &'static str, value: String },
}
