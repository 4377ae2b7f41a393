//! Transponder, channel and state types.

use serde::{Deserialize, Serialize};

/// Delivery system of a transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransmissionType {
    /// DVB-C (cable).
    DvbC,
    /// DVB-S (satellite).
    DvbS,
    /// DVB-S2 (satellite, second generation).
    DvbS2,
    /// DVB-T (terrestrial).
    DvbT,
    /// ATSC (terrestrial / cable, North America).
    Atsc,
}

impl TransmissionType {
    /// Whether tuning requires LNB / DiSEqC handling.
    pub fn is_satellite(self) -> bool {
        matches!(self, TransmissionType::DvbS | TransmissionType::DvbS2)
    }

    /// Whether the delivery system carries a DVB network information table.
    pub fn has_nit(self) -> bool {
        !matches!(self, TransmissionType::Atsc)
    }
}

/// Implements the scan-file token mapping for a parameter enum.
macro_rules! tokens {
    ($ty:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        impl $ty {
            /// Scan-file token for this value.
            pub fn token(self) -> &'static str {
                match self {
                    $($ty::$variant => $token,)+
                }
            }

            /// Parse a scan-file token (case-insensitive).
            pub fn from_token(token: &str) -> Option<Self> {
                $(
                    if token.eq_ignore_ascii_case($token) {
                        return Some($ty::$variant);
                    }
                )+
                None
            }
        }
    };
}

/// Satellite polarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

tokens!(Polarization {
    Horizontal => "H",
    Vertical => "V",
    CircularLeft => "L",
    CircularRight => "R",
});

impl Polarization {
    /// Horizontal and circular-left share the 18V LNB setting.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Polarization::Horizontal | Polarization::CircularLeft)
    }
}

/// Forward error correction code rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FecRate {
    None,
    Fec1_2,
    Fec2_3,
    Fec3_4,
    Fec4_5,
    Fec5_6,
    Fec6_7,
    Fec7_8,
    Fec8_9,
    Auto,
}

tokens!(FecRate {
    None => "NONE",
    Fec1_2 => "1/2",
    Fec2_3 => "2/3",
    Fec3_4 => "3/4",
    Fec4_5 => "4/5",
    Fec5_6 => "5/6",
    Fec6_7 => "6/7",
    Fec7_8 => "7/8",
    Fec8_9 => "8/9",
    Auto => "AUTO",
});

/// Modulation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modulation {
    Qpsk,
    Psk8,
    Qam16,
    Qam32,
    Qam64,
    Qam128,
    Qam256,
    Vsb8,
    Vsb16,
    Auto,
}

tokens!(Modulation {
    Qpsk => "QPSK",
    Psk8 => "8PSK",
    Qam16 => "QAM16",
    Qam32 => "QAM32",
    Qam64 => "QAM64",
    Qam128 => "QAM128",
    Qam256 => "QAM256",
    Vsb8 => "8VSB",
    Vsb16 => "16VSB",
    Auto => "AUTO",
});

/// Terrestrial channel bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bandwidth {
    Bandwidth6Mhz,
    Bandwidth7Mhz,
    Bandwidth8Mhz,
    Auto,
}

tokens!(Bandwidth {
    Bandwidth6Mhz => "6MHz",
    Bandwidth7Mhz => "7MHz",
    Bandwidth8Mhz => "8MHz",
    Auto => "AUTO",
});

/// OFDM transmission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransmissionMode {
    Mode2k,
    Mode4k,
    Mode8k,
    Auto,
}

tokens!(TransmissionMode {
    Mode2k => "2k",
    Mode4k => "4k",
    Mode8k => "8k",
    Auto => "AUTO",
});

/// OFDM guard interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardInterval {
    Interval1_32,
    Interval1_16,
    Interval1_8,
    Interval1_4,
    Auto,
}

tokens!(GuardInterval {
    Interval1_32 => "1/32",
    Interval1_16 => "1/16",
    Interval1_8 => "1/8",
    Interval1_4 => "1/4",
    Auto => "AUTO",
});

/// OFDM hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hierarchy {
    None,
    Hierarchy1,
    Hierarchy2,
    Hierarchy4,
    Auto,
}

tokens!(Hierarchy {
    None => "NONE",
    Hierarchy1 => "1",
    Hierarchy2 => "2",
    Hierarchy4 => "4",
    Auto => "AUTO",
});

/// DVB-S2 roll-off factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollOff {
    RollOff20,
    RollOff25,
    RollOff35,
    Auto,
}

tokens!(RollOff {
    RollOff20 => "20",
    RollOff25 => "25",
    RollOff35 => "35",
    Auto => "AUTO",
});

/// DVB-C transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvbCTransponder {
    /// Frequency in Hz.
    pub frequency: u32,
    /// Symbols per second.
    pub symbol_rate: u32,
    pub modulation: Modulation,
    pub fec_rate: FecRate,
}

/// DVB-S transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvbSTransponder {
    /// Frequency in kHz.
    pub frequency: u32,
    pub polarization: Polarization,
    /// Symbols per second.
    pub symbol_rate: u32,
    pub fec_rate: FecRate,
}

/// DVB-S2 transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvbS2Transponder {
    /// Frequency in kHz.
    pub frequency: u32,
    pub polarization: Polarization,
    /// Symbols per second.
    pub symbol_rate: u32,
    pub fec_rate: FecRate,
    pub roll_off: RollOff,
    pub modulation: Modulation,
}

/// DVB-T transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvbTTransponder {
    /// Frequency in Hz.
    pub frequency: u32,
    pub bandwidth: Bandwidth,
    pub fec_rate_high: FecRate,
    pub fec_rate_low: FecRate,
    pub modulation: Modulation,
    pub transmission_mode: TransmissionMode,
    pub guard_interval: GuardInterval,
    pub hierarchy: Hierarchy,
}

impl DvbTTransponder {
    /// Whether any parameter is left to the demodulator.
    pub fn has_auto_parameters(&self) -> bool {
        self.fec_rate_high == FecRate::Auto
            || self.guard_interval == GuardInterval::Auto
            || self.modulation == Modulation::Auto
            || self.transmission_mode == TransmissionMode::Auto
    }
}

/// ATSC transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtscTransponder {
    /// Frequency in Hz.
    pub frequency: u32,
    pub modulation: Modulation,
}

/// Tuning parameters of one broadcast multiplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transponder {
    DvbC(DvbCTransponder),
    DvbS(DvbSTransponder),
    DvbS2(DvbS2Transponder),
    DvbT(DvbTTransponder),
    Atsc(AtscTransponder),
}

impl Transponder {
    /// Delivery system of this transponder.
    pub fn transmission_type(&self) -> TransmissionType {
        match self {
            Transponder::DvbC(_) => TransmissionType::DvbC,
            Transponder::DvbS(_) => TransmissionType::DvbS,
            Transponder::DvbS2(_) => TransmissionType::DvbS2,
            Transponder::DvbT(_) => TransmissionType::DvbT,
            Transponder::Atsc(_) => TransmissionType::Atsc,
        }
    }

    /// Frequency as stored (kHz for satellite, Hz otherwise).
    pub fn frequency(&self) -> u32 {
        match self {
            Transponder::DvbC(t) => t.frequency,
            Transponder::DvbS(t) => t.frequency,
            Transponder::DvbS2(t) => t.frequency,
            Transponder::DvbT(t) => t.frequency,
            Transponder::Atsc(t) => t.frequency,
        }
    }

    /// Satellite frequency and polarization, for DVB-S and DVB-S2.
    pub fn satellite_params(&self) -> Option<(u32, Polarization)> {
        self.as_dvb_s().map(|t| (t.frequency, t.polarization))
    }

    /// DVB-S view of a DVB-S or DVB-S2 transponder.
    pub fn as_dvb_s(&self) -> Option<DvbSTransponder> {
        match self {
            Transponder::DvbS(t) => Some(*t),
            Transponder::DvbS2(t) => Some(DvbSTransponder {
                frequency: t.frequency,
                polarization: t.polarization,
                symbol_rate: t.symbol_rate,
                fec_rate: t.fec_rate,
            }),
            _ => None,
        }
    }

    /// Copy of this transponder with the satellite frequency replaced.
    ///
    /// Non-satellite transponders are returned unchanged.
    pub fn with_satellite_frequency(&self, frequency: u32) -> Transponder {
        let mut copy = *self;
        match &mut copy {
            Transponder::DvbS(t) => t.frequency = frequency,
            Transponder::DvbS2(t) => t.frequency = frequency,
            _ => {}
        }
        copy
    }

    /// DVB-T parameters, if this is a terrestrial transponder.
    pub fn as_dvb_t(&self) -> Option<&DvbTTransponder> {
        match self {
            Transponder::DvbT(t) => Some(t),
            _ => None,
        }
    }
}

/// State of a tuner device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// Not owned by anybody.
    Released,
    /// Acquired, not tuned.
    Idle,
    /// Tune command issued, waiting for lock.
    Tuning,
    /// Dish is moving, waiting for lock with an extended timeout.
    RotorMoving,
    /// Frontend reports lock.
    Tuned,
    /// Hardware disappeared or is unusable.
    NotReady,
}

impl DeviceState {
    /// Get display name.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceState::Released => "released",
            DeviceState::Idle => "idle",
            DeviceState::Tuning => "tuning",
            DeviceState::RotorMoving => "rotor moving",
            DeviceState::Tuned => "tuned",
            DeviceState::NotReady => "not ready",
        }
    }
}

/// Phase of the channel scan for the current transponder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanState {
    Tune,
    Pat,
    Nit,
    Sdt,
    Pmt,
}

/// A channel discovered by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCandidate {
    /// Service name (initially `[program number]`).
    pub name: String,
    /// Service provider name.
    pub provider: String,
    /// Scan source the channel was found on.
    pub source: String,
    /// Service ID (program number).
    pub service_id: u16,
    /// Original network ID.
    pub network_id: Option<u16>,
    /// Transport stream ID.
    pub transport_stream_id: Option<u16>,
    /// Video PID.
    pub video_pid: Option<u16>,
    /// Audio PIDs in PMT order.
    pub audio_pids: Vec<u16>,
    /// PMT PID.
    pub pmt_pid: u16,
    /// Transponder the channel was found on.
    pub transponder: Transponder,
    /// Whether the service is marked as scrambled in the SDT.
    pub scrambled: bool,
    /// Signal-to-noise ratio when the PAT was requested.
    pub snr: Option<u8>,
}

impl ChannelCandidate {
    /// Create a candidate named after its program number.
    pub fn new(source: &str, service_id: u16, pmt_pid: u16, transponder: Transponder) -> Self {
        Self {
            name: format!("[{}]", service_id),
            provider: String::new(),
            source: source.to_string(),
            service_id,
            network_id: None,
            transport_stream_id: None,
            video_pid: None,
            audio_pids: Vec::new(),
            pmt_pid,
            transponder,
            scrambled: false,
            snr: None,
        }
    }

    /// Whether the PMT referenced at least one media stream.
    pub fn has_media(&self) -> bool {
        self.video_pid.is_some() || !self.audio_pids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dvb_t() -> DvbTTransponder {
        DvbTTransponder {
            frequency: 474_000_000,
            bandwidth: Bandwidth::Bandwidth8Mhz,
            fec_rate_high: FecRate::Fec2_3,
            fec_rate_low: FecRate::None,
            modulation: Modulation::Qam16,
            transmission_mode: TransmissionMode::Mode8k,
            guard_interval: GuardInterval::Interval1_4,
            hierarchy: Hierarchy::None,
        }
    }

    #[test]
    fn test_tokens() {
        assert_eq!(FecRate::from_token("3/4"), Some(FecRate::Fec3_4));
        assert_eq!(Modulation::from_token("qam64"), Some(Modulation::Qam64));
        assert_eq!(TransmissionMode::from_token("8K"), Some(TransmissionMode::Mode8k));
        assert_eq!(GuardInterval::Interval1_16.token(), "1/16");
        assert_eq!(Polarization::from_token("X"), None);
    }

    #[test]
    fn test_polarization_voltage_group() {
        assert!(Polarization::Horizontal.is_horizontal());
        assert!(Polarization::CircularLeft.is_horizontal());
        assert!(!Polarization::Vertical.is_horizontal());
        assert!(!Polarization::CircularRight.is_horizontal());
    }

    #[test]
    fn test_auto_parameters() {
        let mut t = dvb_t();
        assert!(!t.has_auto_parameters());
        t.guard_interval = GuardInterval::Auto;
        assert!(t.has_auto_parameters());
    }

    #[test]
    fn test_satellite_frequency_override() {
        let s = Transponder::DvbS(DvbSTransponder {
            frequency: 11_778_000,
            polarization: Polarization::Vertical,
            symbol_rate: 27_500_000,
            fec_rate: FecRate::Fec3_4,
        });
        let shifted = s.with_satellite_frequency(2_028_000);
        assert_eq!(shifted.frequency(), 2_028_000);
        assert_eq!(shifted.satellite_params(), Some((2_028_000, Polarization::Vertical)));

        let t = Transponder::DvbT(dvb_t());
        assert_eq!(t.with_satellite_frequency(1), t);
        assert!(t.satellite_params().is_none());
    }

    #[test]
    fn test_channel_candidate_serializes() {
        let mut ch = ChannelCandidate::new("T-Test", 100, 200, Transponder::DvbT(dvb_t()));
        assert_eq!(ch.name, "[100]");
        assert!(!ch.has_media());
        ch.audio_pids.push(0x101);
        assert!(ch.has_media());

        let json = serde_json::to_string(&ch).unwrap();
        let back: ChannelCandidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ch);
    }
}
