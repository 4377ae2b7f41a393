//! Tuner device control: backend abstraction, satellite equipment control,
//! blind DVB-T search and the device state machine.

pub mod auto_tune;
pub mod backend;
pub mod controller;
pub mod sec;

#[cfg(test)]
pub(crate) mod testing;

pub use auto_tune::AutoTuneState;
pub use backend::{Capabilities, DeviceBackend, SecBurst, SecTone, SecVoltage};
pub use controller::{DvbDevice, DEFAULT_SETTLE_DELAY, FRONTEND_POLL_INTERVAL, ROTOR_TIMEOUT_MS};
