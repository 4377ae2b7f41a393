//! Channel scanning on top of the device controller.

mod engine;
mod filter;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{DvbScan, ScanNotice, MAX_FILTERS};
pub use filter::{FilterType, ScanEvent, ScanEventKind, ScanFilter, Table};
