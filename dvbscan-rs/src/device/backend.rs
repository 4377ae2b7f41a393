//! Hardware abstraction for a tuner device.

use std::fmt;
use std::ops::BitOr;

use dvbscan_protocol::{TransmissionType, Transponder};

use crate::demux::DataChannel;

/// DVB-T parameters the demodulator can detect on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    /// FEC_AUTO on the high priority stream.
    pub const DVB_T_FEC_AUTO: Capabilities = Capabilities(1 << 0);
    /// GUARD_INTERVAL_AUTO.
    pub const DVB_T_GUARD_INTERVAL_AUTO: Capabilities = Capabilities(1 << 1);
    /// QAM_AUTO.
    pub const DVB_T_MODULATION_AUTO: Capabilities = Capabilities(1 << 2);
    /// TRANSMISSION_MODE_AUTO.
    pub const DVB_T_TRANSMISSION_MODE_AUTO: Capabilities = Capabilities(1 << 3);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Capabilities(bits)
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// LNB supply voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecVoltage {
    /// Vertical / circular right.
    Voltage13V,
    /// Horizontal / circular left.
    Voltage18V,
}

/// 22 kHz continuous tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecTone {
    ToneOff,
    ToneOn,
}

/// DiSEqC tone burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecBurst {
    BurstMiniA,
    BurstMiniB,
}

impl fmt::Display for SecVoltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecVoltage::Voltage13V => write!(f, "13V"),
            SecVoltage::Voltage18V => write!(f, "18V"),
        }
    }
}

/// Operations the tuning controller needs from a device driver.
///
/// Every call is a non-blocking request; tuning success is observed by
/// polling [`DeviceBackend::is_tuned`]. Packets are delivered through the
/// [`DataChannel`] handed over by [`DeviceBackend::set_data_channel`].
pub trait DeviceBackend {
    /// Stable identifier of the hardware.
    fn device_id(&self) -> String;

    /// Name of the frontend as reported by the driver.
    fn frontend_name(&self) -> String;

    /// Delivery systems the frontend supports.
    fn transmission_types(&self) -> Vec<TransmissionType>;

    fn capabilities(&self) -> Capabilities;

    /// Give the backend the channel to push packet buffers into.
    fn set_data_channel(&mut self, channel: DataChannel);

    /// Take exclusive ownership of the hardware.
    fn acquire(&mut self) -> bool;

    fn release(&mut self);

    fn set_tone(&mut self, tone: SecTone);

    fn set_voltage(&mut self, voltage: SecVoltage);

    /// Send a raw DiSEqC message.
    fn send_message(&mut self, message: &[u8]);

    fn send_burst(&mut self, burst: SecBurst);

    /// Issue the tune command. For satellite transponders the frequency is
    /// already the intermediate frequency.
    fn tune(&mut self, transponder: &Transponder) -> bool;

    /// Signal strength in percent, `None` when unsupported.
    fn signal(&mut self) -> Option<u8>;

    /// Signal-to-noise ratio in percent, `None` when unsupported.
    fn snr(&mut self) -> Option<u8>;

    fn is_tuned(&mut self) -> bool;

    /// Start delivering packets of `pid`; fails when the hardware filter
    /// table is exhausted.
    fn add_pid_filter(&mut self, pid: u16) -> bool;

    fn remove_pid_filter(&mut self, pid: u16);

    /// Start descrambling the service described by a raw PMT section.
    fn start_descrambling(&mut self, pmt_section: &[u8]);

    fn stop_descrambling(&mut self, service_id: u16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::DVB_T_FEC_AUTO | Capabilities::DVB_T_MODULATION_AUTO;
        assert!(caps.contains(Capabilities::DVB_T_FEC_AUTO));
        assert!(caps.contains(Capabilities::DVB_T_MODULATION_AUTO));
        assert!(!caps.contains(Capabilities::DVB_T_GUARD_INTERVAL_AUTO));
        assert!(caps.contains(Capabilities::NONE));
        assert_eq!(Capabilities::from_bits(caps.bits()), caps);
    }
}
