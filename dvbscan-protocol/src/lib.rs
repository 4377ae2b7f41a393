//! Shared data types for the dvbscan demultiplexer, tuner and channel scanner.
//!
//! This crate defines the transponder descriptions handed to the tuning
//! controller, the device and scan states, the channel candidates produced by
//! a scan and the error types shared by the other crates.
//!
//! # Transponders
//!
//! Transponders are read from and written to dvb-apps style initial tuning
//! lines:
//!
//! ```rust
//! use dvbscan_protocol::{Transponder, TransmissionType};
//!
//! let t: Transponder = "S 11778000 V 27500000 3/4".parse().unwrap();
//! assert_eq!(t.transmission_type(), TransmissionType::DvbS);
//! assert_eq!(t.to_string(), "S 11778000 V 27500000 3/4");
//! ```
//!
//! # Channels
//!
//! - [`ChannelCandidate`]: one service found by a scan
//! - [`DeviceState`]: tuner life cycle as observed by the scan
//! - [`ScanState`]: per-transponder acquisition phase

pub mod error;
pub mod scanfile;
pub mod types;

pub use error::{DeviceError, PsiError, TransponderParseError};
pub use scanfile::parse_scan_file;
pub use types::{
    AtscTransponder, Bandwidth, ChannelCandidate, DeviceState, DvbCTransponder,
    DvbS2Transponder, DvbSTransponder, DvbTTransponder, FecRate, GuardInterval, Hierarchy,
    Modulation, Polarization, RollOff, ScanState, TransmissionMode, TransmissionType,
    Transponder,
};
