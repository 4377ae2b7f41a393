//! The descriptors a scan reads out of the SDT and NIT loops.

use dvbscan_protocol::{Bandwidth, FecRate, Modulation, Polarization, PsiError};

use super::text::decode_dvb_string;

/// Service descriptor (0x48): type, provider and service name.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider_name: String,
    pub service_name: String,
}

/// Splits a string with a one-byte length prefix off the front of `data`.
fn length_prefixed<'a>(
    data: &'a [u8],
    what: &'static str,
) -> Result<(&'a [u8], &'a [u8]), PsiError> {
    let (&length, rest) = data.split_first().ok_or(PsiError::Malformed(what))?;
    let length = length as usize;
    if rest.len() < length {
        return Err(PsiError::Malformed(what));
    }
    Ok(rest.split_at(length))
}

impl ServiceDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, PsiError> {
        let (&service_type, rest) = data
            .split_first()
            .ok_or(PsiError::Malformed("service descriptor too short"))?;
        let (provider, rest) = length_prefixed(rest, "invalid provider name length")?;
        let (service, _) = length_prefixed(rest, "invalid service name length")?;

        Ok(ServiceDescriptor {
            service_type,
            provider_name: decode_dvb_string(provider),
            service_name: decode_dvb_string(service),
        })
    }

    pub fn service_type_name(&self) -> &'static str {
        match self.service_type {
            0x01 => "Digital TV",
            0x02 => "Digital Radio",
            0x03 => "Teletext",
            0x0A => "Advanced Codec Digital Radio",
            0x0C => "Data Broadcast",
            0x11 => "MPEG-2 HD Digital TV",
            0x16 => "Advanced Codec SD Digital TV",
            0x19 => "Advanced Codec HD Digital TV",
            0x1F => "HEVC Digital TV",
            _ => "Unknown",
        }
    }
}

/// Network name descriptor (0x40); the payload is the name itself.
#[derive(Debug, Clone, Default)]
pub struct NetworkNameDescriptor {
    pub network_name: String,
}

impl NetworkNameDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, PsiError> {
        Ok(NetworkNameDescriptor {
            network_name: decode_dvb_string(data),
        })
    }
}

/// Satellite delivery system descriptor (0x43).
#[derive(Debug, Clone, Default)]
pub struct SatelliteDeliveryDescriptor {
    /// Frequency in kHz.
    pub frequency: u32,
    /// Orbital position (degrees * 10).
    pub orbital_position: u16,
    /// West/East flag (false = East).
    pub west_east_flag: bool,
    /// Polarization (0 = H, 1 = V, 2 = L, 3 = R).
    pub polarization: u8,
    /// Roll-off (DVB-S2 only).
    pub roll_off: u8,
    /// Modulation system (0 = DVB-S, 1 = DVB-S2).
    pub modulation_system: u8,
    /// Modulation type.
    pub modulation_type: u8,
    /// Symbol rate in symbols/sec.
    pub symbol_rate: u32,
    /// FEC inner.
    pub fec_inner: u8,
}

impl SatelliteDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, PsiError> {
        if data.len() < 11 {
            return Err(PsiError::Malformed("satellite delivery descriptor too short"));
        }

        // 8 BCD digits in units of 10 kHz
        let frequency = bcd_to_u32(&data[0..4], 8) * 10;
        let orbital_position = bcd_to_u32(&data[4..6], 4) as u16;

        let west_east_flag = data[6] & 0x80 != 0;
        let polarization = (data[6] >> 5) & 0x03;
        let roll_off = (data[6] >> 3) & 0x03;
        let modulation_system = (data[6] >> 2) & 0x01;
        let modulation_type = data[6] & 0x03;

        // 7 BCD digits in units of 100 symbols/s, then the FEC nibble
        let symbol_rate = bcd_to_u32(&data[7..11], 7) * 100;
        let fec_inner = data[10] & 0x0F;

        Ok(SatelliteDeliveryDescriptor {
            frequency,
            orbital_position,
            west_east_flag,
            polarization,
            roll_off,
            modulation_system,
            modulation_type,
            symbol_rate,
            fec_inner,
        })
    }

    /// Whether the transponder is a DVB-S2 carrier.
    pub fn is_dvb_s2(&self) -> bool {
        self.modulation_system == 1
    }

    pub fn polarization(&self) -> Polarization {
        match self.polarization {
            0 => Polarization::Horizontal,
            1 => Polarization::Vertical,
            2 => Polarization::CircularLeft,
            _ => Polarization::CircularRight,
        }
    }

    /// Inner FEC, with rates DVB-S cannot signal (3/5, 9/10) mapped to auto.
    pub fn fec_rate(&self) -> FecRate {
        match self.fec_inner {
            1 => FecRate::Fec1_2,
            2 => FecRate::Fec2_3,
            3 => FecRate::Fec3_4,
            4 => FecRate::Fec5_6,
            5 => FecRate::Fec7_8,
            6 => FecRate::Fec8_9,
            8 => FecRate::Fec4_5,
            _ => FecRate::Auto,
        }
    }
}

/// Cable delivery system descriptor (0x44).
#[derive(Debug, Clone, Default)]
pub struct CableDeliveryDescriptor {
    /// Frequency in Hz.
    pub frequency: u32,
    /// FEC outer.
    pub fec_outer: u8,
    /// Modulation (1 = 16-QAM ... 5 = 256-QAM).
    pub modulation: u8,
    /// Symbol rate in symbols/sec.
    pub symbol_rate: u32,
    /// FEC inner.
    pub fec_inner: u8,
}

impl CableDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, PsiError> {
        if data.len() < 11 {
            return Err(PsiError::Malformed("cable delivery descriptor too short"));
        }

        Ok(CableDeliveryDescriptor {
            // 8 BCD digits in units of 100 Hz
            frequency: bcd_to_u32(&data[0..4], 8).saturating_mul(100),
            fec_outer: data[5] & 0x0F,
            modulation: data[6],
            symbol_rate: bcd_to_u32(&data[7..11], 7) * 100,
            fec_inner: data[10] & 0x0F,
        })
    }

    pub fn modulation(&self) -> Modulation {
        match self.modulation {
            1 => Modulation::Qam16,
            2 => Modulation::Qam32,
            3 => Modulation::Qam64,
            4 => Modulation::Qam128,
            5 => Modulation::Qam256,
            _ => Modulation::Auto,
        }
    }
}

/// Terrestrial delivery system descriptor (0x5A).
#[derive(Debug, Clone, Default)]
pub struct TerrestrialDeliveryDescriptor {
    /// Centre frequency in Hz.
    pub frequency: u32,
    /// Bandwidth (0 = 8 MHz, 1 = 7 MHz, 2 = 6 MHz).
    pub bandwidth: u8,
    /// Constellation (0 = QPSK, 1 = 16-QAM, 2 = 64-QAM).
    pub constellation: u8,
    /// Hierarchy information.
    pub hierarchy: u8,
    /// Code rate of the high priority stream.
    pub code_rate_hp: u8,
    /// Code rate of the low priority stream.
    pub code_rate_lp: u8,
    /// Guard interval (0 = 1/32 ... 3 = 1/4).
    pub guard_interval: u8,
    /// Transmission mode (0 = 2k, 1 = 8k, 2 = 4k).
    pub transmission_mode: u8,
    /// Other frequency flag.
    pub other_frequency: bool,
}

impl TerrestrialDeliveryDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self, PsiError> {
        if data.len() < 7 {
            return Err(PsiError::Malformed("terrestrial delivery descriptor too short"));
        }

        // Binary, in units of 10 Hz
        let centre = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

        Ok(TerrestrialDeliveryDescriptor {
            frequency: centre.saturating_mul(10),
            bandwidth: data[4] >> 5,
            constellation: data[5] >> 6,
            hierarchy: (data[5] >> 3) & 0x07,
            code_rate_hp: data[5] & 0x07,
            code_rate_lp: data[6] >> 5,
            guard_interval: (data[6] >> 3) & 0x03,
            transmission_mode: (data[6] >> 1) & 0x03,
            other_frequency: data[6] & 0x01 != 0,
        })
    }

    pub fn bandwidth(&self) -> Bandwidth {
        match self.bandwidth {
            0 => Bandwidth::Bandwidth8Mhz,
            1 => Bandwidth::Bandwidth7Mhz,
            2 => Bandwidth::Bandwidth6Mhz,
            _ => Bandwidth::Auto,
        }
    }
}

/// `(tag, payload)` pairs of a descriptor loop, up to the first
/// descriptor whose length runs past the loop.
pub fn parse_descriptor_loop(data: &[u8]) -> Vec<(u8, &[u8])> {
    let mut descriptors = Vec::new();
    let mut offset = 0;

    while offset + 2 <= data.len() {
        let tag = data[offset];
        let length = data[offset + 1] as usize;
        offset += 2;

        if offset + length > data.len() {
            log::debug!("invalid descriptor");
            break;
        }

        descriptors.push((tag, &data[offset..offset + length]));
        offset += length;
    }

    descriptors
}

/// Payload of the first descriptor tagged `tag`.
pub fn find_descriptor(data: &[u8], tag: u8) -> Option<&[u8]> {
    parse_descriptor_loop(data)
        .into_iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, d)| d)
}

/// Convert the first `digits` BCD nibbles of `data` to an integer.
fn bcd_to_u32(data: &[u8], digits: usize) -> u32 {
    let mut result = 0u32;
    for i in 0..digits {
        let byte = data[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        result = result * 10 + nibble as u32;
    }
    result
}
