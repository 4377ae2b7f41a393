//! dvbscan library - DVB transport stream demultiplexer, tuner control and
//! channel scanner.
//!
//! A [`DvbDevice`] wraps a hardware [`DeviceBackend`]. The backend fills
//! packet buffers from its own thread; the device dispatches them to PID
//! and section filters on the control task, drives the tuning sequence
//! (including LNB, DiSEqC and rotor commands) and publishes its state.
//! A [`DvbScan`] uses section filters on the device to discover channels,
//! and [`run_scan`] runs both in one async loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use dvbscan::{run_scan, DeviceBackend, DvbConfig, DvbDevice, DvbScan};
//! use dvbscan_protocol::Transponder;
//!
//! async fn scan<B: DeviceBackend>(backend: B, transponders: Vec<Transponder>) {
//!     let mut device = DvbDevice::new(backend);
//!     device.acquire(DvbConfig::default()).unwrap();
//!
//!     let (scan, notices) = DvbScan::offline("T-de-Berlin", transponders);
//!     let (_cancel, cancel_rx) = tokio::sync::oneshot::channel();
//!     let outcome = run_scan(&mut device, scan, notices, cancel_rx).await;
//!     println!("{} channels", outcome.channels.len());
//! }
//! ```

pub mod config;
pub mod demux;
pub mod device;
pub mod scan;
pub mod session;
pub mod ts_analyzer;

// Re-export commonly used types
pub use config::{ConfigError, DvbConfig, SatelliteConfiguration};
pub use demux::{DataChannel, FilterId, PidFilter, SectionFilter};
pub use device::{DeviceBackend, DvbDevice};
pub use scan::{DvbScan, ScanNotice};
pub use session::{run_scan, ScanOutcome};
