//! Initial tuning file lines (dvb-apps format).
//!
//! ```text
//! T 474000000 8MHz 2/3 NONE QAM16 8k 1/4 NONE
//! C 346000000 6900000 NONE QAM64
//! S 11778000 V 27500000 3/4
//! S2 11914500 H 27500000 AUTO 35 8PSK
//! A 57028615 8VSB
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::TransponderParseError;
use crate::types::*;

struct Fields<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn next_str(&mut self, field: &'static str) -> Result<&'a str, TransponderParseError> {
        self.iter
            .next()
            .ok_or(TransponderParseError::MissingField(field))
    }

    fn number(&mut self, field: &'static str) -> Result<u32, TransponderParseError> {
        let value = self.next_str(field)?;
        value.parse().map_err(|_| TransponderParseError::BadValue {
            field,
            value: value.to_string(),
        })
    }

    fn token<T>(
        &mut self,
        field: &'static str,
        parse: fn(&str) -> Option<T>,
    ) -> Result<T, TransponderParseError> {
        let value = self.next_str(field)?;
        parse(value).ok_or_else(|| TransponderParseError::BadValue {
            field,
            value: value.to_string(),
        })
    }
}

impl FromStr for Transponder {
    type Err = TransponderParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut iter = line.split_whitespace();
        let kind = iter.next().ok_or(TransponderParseError::Empty)?;
        let mut f = Fields { iter };

        let transponder = match kind {
            "T" => Transponder::DvbT(DvbTTransponder {
                frequency: f.number("frequency")?,
                bandwidth: f.token("bandwidth", Bandwidth::from_token)?,
                fec_rate_high: f.token("fec_hp", FecRate::from_token)?,
                fec_rate_low: f.token("fec_lp", FecRate::from_token)?,
                modulation: f.token("modulation", Modulation::from_token)?,
                transmission_mode: f.token("transmission_mode", TransmissionMode::from_token)?,
                guard_interval: f.token("guard_interval", GuardInterval::from_token)?,
                hierarchy: f.token("hierarchy", Hierarchy::from_token)?,
            }),
            "C" => Transponder::DvbC(DvbCTransponder {
                frequency: f.number("frequency")?,
                symbol_rate: f.number("symbol_rate")?,
                fec_rate: f.token("fec", FecRate::from_token)?,
                modulation: f.token("modulation", Modulation::from_token)?,
            }),
            "S" => Transponder::DvbS(DvbSTransponder {
                frequency: f.number("frequency")?,
                polarization: f.token("polarization", Polarization::from_token)?,
                symbol_rate: f.number("symbol_rate")?,
                fec_rate: f.token("fec", FecRate::from_token)?,
            }),
            "S2" => Transponder::DvbS2(DvbS2Transponder {
                frequency: f.number("frequency")?,
                polarization: f.token("polarization", Polarization::from_token)?,
                symbol_rate: f.number("symbol_rate")?,
                fec_rate: f.token("fec", FecRate::from_token)?,
                roll_off: f.token("roll_off", RollOff::from_token)?,
                modulation: f.token("modulation", Modulation::from_token)?,
            }),
            "A" => Transponder::Atsc(AtscTransponder {
                frequency: f.number("frequency")?,
                modulation: f.token("modulation", Modulation::from_token)?,
            }),
            other => return Err(TransponderParseError::UnknownType(other.to_string())),
        };

        Ok(transponder)
    }
}

impl fmt::Display for Transponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transponder::DvbT(t) => write!(
                f,
                "T {} {} {} {} {} {} {} {}",
                t.frequency,
                t.bandwidth.token(),
                t.fec_rate_high.token(),
                t.fec_rate_low.token(),
                t.modulation.token(),
                t.transmission_mode.token(),
                t.guard_interval.token(),
                t.hierarchy.token()
            ),
            Transponder::DvbC(t) => write!(
                f,
                "C {} {} {} {}",
                t.frequency,
                t.symbol_rate,
                t.fec_rate.token(),
                t.modulation.token()
            ),
            Transponder::DvbS(t) => write!(
                f,
                "S {} {} {} {}",
                t.frequency,
                t.polarization.token(),
                t.symbol_rate,
                t.fec_rate.token()
            ),
            Transponder::DvbS2(t) => write!(
                f,
                "S2 {} {} {} {} {} {}",
                t.frequency,
                t.polarization.token(),
                t.symbol_rate,
                t.fec_rate.token(),
                t.roll_off.token(),
                t.modulation.token()
            ),
            Transponder::Atsc(t) => write!(f, "A {} {}", t.frequency, t.modulation.token()),
        }
    }
}

/// Parse a whole initial tuning file, skipping blank lines and `#` comments.
///
/// Returns the first parse failure together with its 1-based line number.
pub fn parse_scan_file(text: &str) -> Result<Vec<Transponder>, (usize, TransponderParseError)> {
    let mut transponders = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let transponder = line.parse().map_err(|e| (index + 1, e))?;
        transponders.push(transponder);
    }
    Ok(transponders)
}
