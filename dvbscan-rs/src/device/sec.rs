//! Satellite equipment control: LNB band selection, DiSEqC switch and
//! rotor commands.

use std::f64::consts::PI;

use super::backend::SecBurst;
use crate::config::SatelliteSection;

/// Earth radius in km.
const EARTH_RADIUS: f64 = 6378.0;

/// Geostationary orbit radius in km.
const ORBIT_RADIUS: f64 = 42164.0;

/// Frequency to tune after down conversion by the LNB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermediateFrequency {
    /// kHz.
    pub frequency: u32,
    /// Whether the high band (22 kHz tone) is selected.
    pub high_band: bool,
}

/// Down-convert a satellite frequency (kHz).
///
/// With a switch frequency the LNB has two oscillators selected by band;
/// without one but with a high band oscillator, the polarization selects the
/// oscillator; otherwise only the low band oscillator exists.
pub fn intermediate_frequency(
    frequency: u32,
    horizontal: bool,
    lnb: &SatelliteSection,
) -> IntermediateFrequency {
    let (oscillator, high_band) = if lnb.switch_frequency != 0 {
        if frequency < lnb.switch_frequency {
            (lnb.low_band_frequency, false)
        } else {
            (lnb.high_band_frequency, true)
        }
    } else if lnb.high_band_frequency != 0 {
        if horizontal {
            (lnb.low_band_frequency, false)
        } else {
            (lnb.high_band_frequency, false)
        }
    } else {
        (lnb.low_band_frequency, false)
    };

    IntermediateFrequency {
        frequency: frequency.abs_diff(oscillator),
        high_band,
    }
}

/// DiSEqC 1.0 committed switch command.
pub fn diseqc_switch_message(lnb_number: u8, horizontal: bool, high_band: bool) -> [u8; 4] {
    [
        0xE0,
        0x10,
        0x38,
        0xF0 | ((lnb_number & 0x03) << 2) | (u8::from(horizontal) << 1) | u8::from(high_band),
    ]
}

/// Tone burst following the committed switch command.
pub fn switch_burst(lnb_number: u8) -> SecBurst {
    if lnb_number & 0x01 == 0 {
        SecBurst::BurstMiniA
    } else {
        SecBurst::BurstMiniB
    }
}

/// Orbital position in degrees (east positive) taken from the last `-`
/// separated part of a source name, e.g. `Astra-19.2E` or `S30W`.
pub fn orbital_position(source: &str) -> Option<f64> {
    let position = match source.rfind('-') {
        Some(index) => &source[index + 1..],
        None => source,
    };

    if let Some(east) = position.strip_suffix('E') {
        east.trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse::<f64>()
            .ok()
    } else if let Some(west) = position.strip_suffix('W') {
        west.trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse::<f64>()
            .ok()
            .map(|value| -value)
    } else {
        None
    }
}

/// Rotor angle in radians for a satellite seen from the given site
/// (degrees, north and east positive). Positive angles are east.
pub fn usals_angle(latitude: f64, longitude: f64, orbital_position: f64) -> f64 {
    let site = EARTH_RADIUS * (latitude * PI / 180.0).cos();
    let delta = (orbital_position - longitude) * PI / 180.0;
    delta + (delta.sin() / (ORBIT_RADIUS / site - delta.cos())).atan()
}

/// DiSEqC 1.2 "goto angle" command.
pub fn usals_message(latitude: f64, longitude: f64, orbital_position: f64) -> [u8; 5] {
    let angle = usals_angle(latitude, longitude, orbital_position);

    // Sixteenths of a degree; the high nibble selects east or west
    let sixteenths = (16.0 * angle.abs() * 180.0 / PI + 0.5) as u16;
    let value = if angle >= 0.0 {
        sixteenths | 0xE000
    } else {
        sixteenths | 0xD000
    };

    [0xE0, 0x31, 0x6E, (value >> 8) as u8, value as u8]
}

/// DiSEqC 1.2 "goto stored position" command.
pub fn positions_message(position: u8) -> [u8; 4] {
    [0xE0, 0x31, 0x6B, position]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universal() -> SatelliteSection {
        SatelliteSection::default()
    }

    #[test]
    fn test_universal_lnb() {
        let low = intermediate_frequency(11_362_000, true, &universal());
        assert_eq!(low.frequency, 1_612_000);
        assert!(!low.high_band);

        let high = intermediate_frequency(12_188_000, false, &universal());
        assert_eq!(high.frequency, 1_588_000);
        assert!(high.high_band);

        // The switch frequency itself is high band
        assert!(intermediate_frequency(11_700_000, false, &universal()).high_band);
    }

    #[test]
    fn test_polarization_selected_lnb() {
        let lnb = SatelliteSection {
            low_band_frequency: 10_750_000,
            switch_frequency: 0,
            high_band_frequency: 11_250_000,
            ..SatelliteSection::default()
        };

        let h = intermediate_frequency(12_000_000, true, &lnb);
        assert_eq!(h.frequency, 1_250_000);
        assert!(!h.high_band);

        let v = intermediate_frequency(12_000_000, false, &lnb);
        assert_eq!(v.frequency, 750_000);
        assert!(!v.high_band);
    }

    #[test]
    fn test_single_oscillator() {
        let lnb = SatelliteSection {
            low_band_frequency: 5_150_000,
            switch_frequency: 0,
            high_band_frequency: 0,
            ..SatelliteSection::default()
        };

        // C band LNBs oscillate above the received frequency
        let c = intermediate_frequency(3_880_000, false, &lnb);
        assert_eq!(c.frequency, 1_270_000);
        assert!(!c.high_band);
    }

    #[test]
    fn test_switch_message() {
        assert_eq!(diseqc_switch_message(0, false, false), [0xE0, 0x10, 0x38, 0xF0]);
        assert_eq!(diseqc_switch_message(0, true, true), [0xE0, 0x10, 0x38, 0xF3]);
        assert_eq!(diseqc_switch_message(3, true, false), [0xE0, 0x10, 0x38, 0xFE]);
        assert_eq!(switch_burst(0), SecBurst::BurstMiniA);
        assert_eq!(switch_burst(1), SecBurst::BurstMiniB);
        assert_eq!(switch_burst(2), SecBurst::BurstMiniA);
    }

    #[test]
    fn test_orbital_position() {
        assert_eq!(orbital_position("S19.2E"), Some(19.2));
        assert_eq!(orbital_position("Astra-19.2E"), Some(19.2));
        assert_eq!(orbital_position("Intelsat-30W"), Some(-30.0));
        assert_eq!(orbital_position("Hotbird-13.0E"), Some(13.0));
        assert_eq!(orbital_position("T-de-Berlin"), None);
        assert_eq!(orbital_position(""), None);
    }

    #[test]
    fn test_usals() {
        // Satellite due south: no rotation
        assert!(usals_angle(50.0, 10.0, 10.0).abs() < 1e-9);
        assert_eq!(usals_message(50.0, 10.0, 10.0), [0xE0, 0x31, 0x6E, 0xE0, 0x00]);

        let east = usals_angle(50.0, 0.0, 19.2);
        assert!(east > 0.0);
        let west = usals_angle(50.0, 0.0, -19.2);
        assert!((east + west).abs() < 1e-9);

        let message = usals_message(50.0, 0.0, 19.2);
        assert_eq!(&message[..3], &[0xE0, 0x31, 0x6E]);
        assert_eq!(message[3] & 0xF0, 0xE0);
        assert_eq!(usals_message(50.0, 0.0, -19.2)[3] & 0xF0, 0xD0);

        let degrees = f64::from(u16::from_be_bytes([message[3] & 0x0F, message[4]])) / 16.0;
        assert!((degrees - east.to_degrees()).abs() <= 1.0 / 16.0);
    }

    #[test]
    fn test_positions_message() {
        assert_eq!(positions_message(5), [0xE0, 0x31, 0x6B, 5]);
    }
}
