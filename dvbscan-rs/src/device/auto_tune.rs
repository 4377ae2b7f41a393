//! Blind search over DVB-T parameters the demodulator cannot detect.

use dvbscan_protocol::{DvbTTransponder, FecRate, GuardInterval, Modulation, TransmissionMode};

use super::backend::Capabilities;

/// Odometer over the unknown parameters of a DVB-T transponder.
///
/// A parameter takes part in the search when the transponder leaves it
/// AUTO and the hardware cannot resolve AUTO itself. Each search starts at
/// the most common value; advancing steps the first category and carries
/// into the next one when a cycle wraps.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoTuneState {
    transponder: DvbTTransponder,
    vary_fec: bool,
    vary_guard_interval: bool,
    vary_modulation: bool,
    vary_transmission_mode: bool,
}

impl AutoTuneState {
    pub fn new(transponder: DvbTTransponder, capabilities: Capabilities) -> Self {
        let mut transponder = transponder;

        let vary_fec = transponder.fec_rate_high == FecRate::Auto
            && !capabilities.contains(Capabilities::DVB_T_FEC_AUTO);
        let vary_guard_interval = transponder.guard_interval == GuardInterval::Auto
            && !capabilities.contains(Capabilities::DVB_T_GUARD_INTERVAL_AUTO);
        let vary_modulation = transponder.modulation == Modulation::Auto
            && !capabilities.contains(Capabilities::DVB_T_MODULATION_AUTO);
        let vary_transmission_mode = transponder.transmission_mode == TransmissionMode::Auto
            && !capabilities.contains(Capabilities::DVB_T_TRANSMISSION_MODE_AUTO);

        if vary_fec {
            transponder.fec_rate_high = FecRate::Fec2_3;
        }
        if vary_guard_interval {
            transponder.guard_interval = GuardInterval::Interval1_8;
        }
        if vary_modulation {
            transponder.modulation = Modulation::Qam64;
        }
        if vary_transmission_mode {
            transponder.transmission_mode = TransmissionMode::Mode8k;
        }

        Self {
            transponder,
            vary_fec,
            vary_guard_interval,
            vary_modulation,
            vary_transmission_mode,
        }
    }

    /// Parameters of the current attempt.
    pub fn transponder(&self) -> &DvbTTransponder {
        &self.transponder
    }

    /// Whether there is anything to search over.
    pub fn has_alternatives(&self) -> bool {
        self.vary_fec
            || self.vary_guard_interval
            || self.vary_modulation
            || self.vary_transmission_mode
    }

    /// Number of combinations the search visits.
    pub fn combinations(&self) -> usize {
        let mut total = 1;
        if self.vary_fec {
            total *= 5;
        }
        if self.vary_guard_interval {
            total *= 4;
        }
        if self.vary_modulation {
            total *= 3;
        }
        if self.vary_transmission_mode {
            total *= 2;
        }
        total
    }

    /// Move to the next combination. Returns false once every combination
    /// was tried; the parameters are then back at their start values.
    pub fn advance(&mut self) -> bool {
        let t = &mut self.transponder;
        let mut carry = true;

        if carry && self.vary_fec {
            (t.fec_rate_high, carry) = next_fec_rate(t.fec_rate_high);
        }

        if carry && self.vary_guard_interval {
            (t.guard_interval, carry) = next_guard_interval(t.guard_interval);
        }

        if carry && self.vary_modulation {
            (t.modulation, carry) = next_modulation(t.modulation);
        }

        if carry && self.vary_transmission_mode {
            (t.transmission_mode, carry) = next_transmission_mode(t.transmission_mode);
        }

        !carry
    }
}

fn next_fec_rate(fec: FecRate) -> (FecRate, bool) {
    match fec {
        FecRate::Fec2_3 => (FecRate::Fec3_4, false),
        FecRate::Fec3_4 => (FecRate::Fec1_2, false),
        FecRate::Fec1_2 => (FecRate::Fec5_6, false),
        FecRate::Fec5_6 => (FecRate::Fec7_8, false),
        _ => (FecRate::Fec2_3, true),
    }
}

fn next_guard_interval(guard: GuardInterval) -> (GuardInterval, bool) {
    match guard {
        GuardInterval::Interval1_8 => (GuardInterval::Interval1_32, false),
        GuardInterval::Interval1_32 => (GuardInterval::Interval1_4, false),
        GuardInterval::Interval1_4 => (GuardInterval::Interval1_16, false),
        GuardInterval::Interval1_16 | GuardInterval::Auto => (GuardInterval::Interval1_8, true),
    }
}

fn next_modulation(modulation: Modulation) -> (Modulation, bool) {
    match modulation {
        Modulation::Qam64 => (Modulation::Qam16, false),
        Modulation::Qam16 => (Modulation::Qpsk, false),
        _ => (Modulation::Qam64, true),
    }
}

fn next_transmission_mode(mode: TransmissionMode) -> (TransmissionMode, bool) {
    match mode {
        // 4k is skipped: few demodulators support it
        TransmissionMode::Mode8k => (TransmissionMode::Mode2k, false),
        _ => (TransmissionMode::Mode8k, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvbscan_protocol::{Bandwidth, Hierarchy};
    use std::collections::HashSet;

    fn all_auto() -> DvbTTransponder {
        DvbTTransponder {
            frequency: 506_000_000,
            bandwidth: Bandwidth::Bandwidth8Mhz,
            fec_rate_high: FecRate::Auto,
            fec_rate_low: FecRate::Auto,
            modulation: Modulation::Auto,
            transmission_mode: TransmissionMode::Auto,
            guard_interval: GuardInterval::Auto,
            hierarchy: Hierarchy::None,
        }
    }

    #[test]
    fn test_defaults_substituted() {
        let state = AutoTuneState::new(all_auto(), Capabilities::NONE);
        let t = state.transponder();
        assert_eq!(t.fec_rate_high, FecRate::Fec2_3);
        assert_eq!(t.guard_interval, GuardInterval::Interval1_8);
        assert_eq!(t.modulation, Modulation::Qam64);
        assert_eq!(t.transmission_mode, TransmissionMode::Mode8k);
        assert_eq!(t.frequency, 506_000_000);
        assert!(state.has_alternatives());
    }

    #[test]
    fn test_supported_auto_kept() {
        let caps = Capabilities::DVB_T_FEC_AUTO
            | Capabilities::DVB_T_GUARD_INTERVAL_AUTO
            | Capabilities::DVB_T_MODULATION_AUTO
            | Capabilities::DVB_T_TRANSMISSION_MODE_AUTO;
        let mut state = AutoTuneState::new(all_auto(), caps);
        assert_eq!(state.transponder(), &all_auto());
        assert!(!state.has_alternatives());
        assert_eq!(state.combinations(), 1);
        assert!(!state.advance());
    }

    #[test]
    fn test_fec_cycle_first() {
        let mut state = AutoTuneState::new(all_auto(), Capabilities::NONE);
        let mut fecs = vec![state.transponder().fec_rate_high];
        for _ in 0..4 {
            assert!(state.advance());
            fecs.push(state.transponder().fec_rate_high);
            assert_eq!(state.transponder().guard_interval, GuardInterval::Interval1_8);
        }
        assert_eq!(
            fecs,
            vec![
                FecRate::Fec2_3,
                FecRate::Fec3_4,
                FecRate::Fec1_2,
                FecRate::Fec5_6,
                FecRate::Fec7_8
            ]
        );

        // Wrap carries into the guard interval
        assert!(state.advance());
        assert_eq!(state.transponder().fec_rate_high, FecRate::Fec2_3);
        assert_eq!(state.transponder().guard_interval, GuardInterval::Interval1_32);
    }

    #[test]
    fn test_search_is_bounded() {
        let mut state = AutoTuneState::new(all_auto(), Capabilities::NONE);
        assert_eq!(state.combinations(), 120);

        let mut seen = HashSet::new();
        seen.insert(format!("{:?}", state.transponder()));
        while state.advance() {
            assert!(seen.insert(format!("{:?}", state.transponder())));
        }

        assert_eq!(seen.len(), 120);
        assert_eq!(state, AutoTuneState::new(all_auto(), Capabilities::NONE));
    }

    #[test]
    fn test_only_unknown_parameters_vary() {
        let mut t = all_auto();
        t.fec_rate_high = FecRate::Fec3_4;
        t.transmission_mode = TransmissionMode::Mode2k;
        let mut state = AutoTuneState::new(t, Capabilities::DVB_T_MODULATION_AUTO);

        assert_eq!(state.combinations(), 4);
        let mut attempts = 1;
        while state.advance() {
            attempts += 1;
            assert_eq!(state.transponder().fec_rate_high, FecRate::Fec3_4);
            assert_eq!(state.transponder().modulation, Modulation::Auto);
            assert_eq!(state.transponder().transmission_mode, TransmissionMode::Mode2k);
        }
        assert_eq!(attempts, 4);
    }
}
