//! Device configuration loaded from TOML.
//!
//! ```toml
//! [device]
//! timeout_ms = 1500
//! source = "S19.2E"
//!
//! [satellite]
//! configuration = "diseqc_switch"
//! lnb_number = 0
//! low_band_frequency = 9750000
//! switch_frequency = 11700000
//! high_band_frequency = 10600000
//!
//! [location]
//! latitude = 52.5
//! longitude = 13.4
//! ```
//!
//! Every section and field is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// How the dish selects a satellite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteConfiguration {
    /// DiSEqC 1.0 committed switch between up to four LNBs.
    #[default]
    DiseqcSwitch,
    /// DiSEqC 1.2 rotor positioned from the site location (USALS).
    UsalsRotor,
    /// DiSEqC 1.2 rotor with stored positions.
    PositionsRotor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Tune timeout in milliseconds.
    pub timeout_ms: u32,
    /// Scan source name, e.g. `S19.2E` or `T-de-Berlin`.
    pub source: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            timeout_ms: 1500,
            source: String::new(),
        }
    }
}

/// LNB and dish settings. Frequencies are in kHz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteSection {
    pub configuration: SatelliteConfiguration,
    /// Switch port or stored rotor position.
    pub lnb_number: u8,
    pub low_band_frequency: u32,
    /// 0 for a single local oscillator.
    pub switch_frequency: u32,
    /// 0 for a single local oscillator.
    pub high_band_frequency: u32,
}

impl Default for SatelliteSection {
    fn default() -> Self {
        // Universal LNB
        Self {
            configuration: SatelliteConfiguration::DiseqcSwitch,
            lnb_number: 0,
            low_band_frequency: 9_750_000,
            switch_frequency: 11_700_000,
            high_band_frequency: 10_600_000,
        }
    }
}

/// Site location in degrees, north and east positive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSection {
    pub latitude: f64,
    pub longitude: f64,
}

/// Configuration of one device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DvbConfig {
    pub device: DeviceSection,
    pub satellite: SatelliteSection,
    pub location: LocationSection,
}

impl DvbConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
