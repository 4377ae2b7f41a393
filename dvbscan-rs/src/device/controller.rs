//! Device life cycle, tuning sequence and frontend polling.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::time::Duration;

use dvbscan_protocol::{DeviceError, DeviceState, TransmissionType, Transponder};
use log::{debug, info, warn};
use tokio::sync::watch;

use super::auto_tune::AutoTuneState;
use super::backend::{DeviceBackend, SecTone, SecVoltage};
use super::sec;
use crate::config::{DvbConfig, SatelliteConfiguration};
use crate::demux::{
    DataChannel, FilterId, PacketDumper, PidDispatcher, PidFilter, SectionFilter,
};
use crate::ts_analyzer::PsiSection;

/// Cadence of [`DvbDevice::poll_frontend`].
pub const FRONTEND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time budget for a tune that moves the rotor, in milliseconds.
pub const ROTOR_TIMEOUT_MS: i32 = 15_000;

/// Delay after each SEC command.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(15);

/// Below this signal strength (percent) a blind search gives up.
const MIN_AUTO_TUNE_SIGNAL: u8 = 15;

/// A tuner device driven through a [`DeviceBackend`].
///
/// All methods run on the control task. The backend only shares the
/// [`DataChannel`] with it; packets are dispatched to the registered
/// filters by [`DvbDevice::process_pending`].
pub struct DvbDevice<B: DeviceBackend> {
    backend: B,
    channel: DataChannel,
    dispatcher: PidDispatcher,
    /// Set while acquired.
    config: Option<DvbConfig>,
    state: watch::Sender<DeviceState>,
    /// Remaining tune budget in milliseconds.
    frontend_timeout: i32,
    /// Whether the frontend is polled.
    polling: bool,
    /// Blind search in progress.
    auto_tune: Option<AutoTuneState>,
    /// Users of each descrambled service.
    descrambling: BTreeMap<u16, Vec<u64>>,
    settle_delay: Duration,
}

impl<B: DeviceBackend> DvbDevice<B> {
    pub fn new(mut backend: B) -> Self {
        let channel = DataChannel::new();
        backend.set_data_channel(channel.clone());
        let (state, _) = watch::channel(DeviceState::Released);

        Self {
            backend,
            channel,
            dispatcher: PidDispatcher::new(),
            config: None,
            state,
            frontend_timeout: 0,
            polling: false,
            auto_tune: None,
            descrambling: BTreeMap::new(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Override the delay after SEC commands.
    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Handle for the packet producer.
    pub fn data_channel(&self) -> &DataChannel {
        &self.channel
    }

    pub fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    /// Observe state transitions. Consecutive identical states are not
    /// reported.
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> Option<&DvbConfig> {
        self.config.as_ref()
    }

    fn set_state(&self, new_state: DeviceState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            *state = new_state;
            true
        });

        if changed {
            debug!("device state: {}", new_state.name());
        }
    }

    pub fn device_id(&self) -> String {
        self.backend.device_id()
    }

    pub fn frontend_name(&self) -> String {
        self.backend.frontend_name()
    }

    pub fn transmission_types(&self) -> Vec<TransmissionType> {
        self.backend.transmission_types()
    }

    /// Take the hardware. Fails with [`DeviceError::Busy`] when it is held
    /// elsewhere.
    pub fn acquire(&mut self, config: DvbConfig) -> Result<(), DeviceError> {
        if self.state() != DeviceState::Released {
            warn!("device is already acquired");
            return Err(DeviceError::InvalidState("device is already acquired"));
        }

        if !self.backend.acquire() {
            info!("device {} is busy", self.backend.device_id());
            return Err(DeviceError::Busy);
        }

        self.config = Some(config);
        self.set_state(DeviceState::Idle);
        Ok(())
    }

    /// Drop all activity and continue with a new configuration.
    pub fn reacquire(&mut self, config: DvbConfig) -> Result<(), DeviceError> {
        if self.state() == DeviceState::Released {
            warn!("device is not acquired");
            return Err(DeviceError::InvalidState("device is not acquired"));
        }

        self.set_state(DeviceState::Released);
        self.stop_activity();
        self.config = Some(config);
        self.set_state(DeviceState::Idle);
        Ok(())
    }

    pub fn release(&mut self) {
        self.set_state(DeviceState::Released);
        self.stop_activity();
        self.config = None;
        self.backend.release();
    }

    /// The hardware disappeared.
    pub fn mark_not_ready(&mut self) {
        self.set_state(DeviceState::NotReady);
        self.stop_activity();
        self.config = None;
    }

    /// Abort tuning, drop every filter and return to idle.
    pub fn stop(&mut self) {
        self.stop_activity();

        if matches!(
            self.state(),
            DeviceState::Tuning | DeviceState::RotorMoving | DeviceState::Tuned
        ) {
            self.set_state(DeviceState::Idle);
        }
    }

    fn stop_activity(&mut self) {
        self.auto_tune = None;
        self.polling = false;
        self.dispatcher.remove_all(&mut self.backend);
    }

    fn check_acquired(&self) -> Result<DvbConfig, DeviceError> {
        match (&self.config, self.state()) {
            (Some(config), state) if state != DeviceState::Released => Ok(config.clone()),
            _ => {
                warn!("device is not acquired");
                Err(DeviceError::InvalidState("device is not acquired"))
            }
        }
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
    }

    /// Start tuning. Success is reported through the state moving to
    /// [`DeviceState::Tuned`] during [`DvbDevice::poll_frontend`].
    ///
    /// Satellite tunes sleep for the settle delay after each SEC command,
    /// blocking the calling thread for up to three delays.
    pub fn tune(&mut self, transponder: &Transponder) -> Result<(), DeviceError> {
        self.auto_tune = None;
        self.start_tune(transponder)
    }

    fn start_tune(&mut self, transponder: &Transponder) -> Result<(), DeviceError> {
        let config = self.check_acquired()?;

        let Some((frequency, polarization)) = transponder.satellite_params() else {
            if !self.backend.tune(transponder) {
                return Err(self.tune_rejected());
            }
            self.tune_accepted(config.device.timeout_ms);
            return Ok(());
        };

        let satellite = &config.satellite;
        let horizontal = polarization.is_horizontal();
        let intermediate = sec::intermediate_frequency(frequency, horizontal, satellite);

        self.backend.set_tone(SecTone::ToneOff);
        self.backend.set_voltage(if horizontal {
            SecVoltage::Voltage18V
        } else {
            SecVoltage::Voltage13V
        });
        self.settle();

        let mut move_rotor = false;

        match satellite.configuration {
            SatelliteConfiguration::DiseqcSwitch => {
                let message = sec::diseqc_switch_message(
                    satellite.lnb_number,
                    horizontal,
                    intermediate.high_band,
                );
                self.backend.send_message(&message);
                self.settle();
                self.backend.send_burst(sec::switch_burst(satellite.lnb_number));
                self.settle();
            }
            SatelliteConfiguration::UsalsRotor => {
                let orbital_position = match sec::orbital_position(&config.device.source) {
                    Some(position) => position,
                    None => {
                        warn!(
                            "cannot extract orbital position from {:?}",
                            config.device.source
                        );
                        0.0
                    }
                };
                let message = sec::usals_message(
                    config.location.latitude,
                    config.location.longitude,
                    orbital_position,
                );
                self.backend.send_message(&message);
                self.settle();
                move_rotor = true;
            }
            SatelliteConfiguration::PositionsRotor => {
                self.backend
                    .send_message(&sec::positions_message(satellite.lnb_number));
                self.settle();
                move_rotor = true;
            }
        }

        self.backend.set_tone(if intermediate.high_band {
            SecTone::ToneOn
        } else {
            SecTone::ToneOff
        });

        let shifted = transponder.with_satellite_frequency(intermediate.frequency);
        if !self.backend.tune(&shifted) {
            return Err(self.tune_rejected());
        }

        if move_rotor {
            self.set_state(DeviceState::RotorMoving);
            self.frontend_timeout = ROTOR_TIMEOUT_MS;
            self.polling = true;
            self.channel.discard();
        } else {
            self.tune_accepted(config.device.timeout_ms);
        }

        Ok(())
    }

    fn tune_accepted(&mut self, timeout_ms: u32) {
        self.set_state(DeviceState::Tuning);
        self.frontend_timeout = i32::try_from(timeout_ms).unwrap_or(i32::MAX);
        self.polling = true;
        self.channel.discard();
    }

    fn tune_rejected(&mut self) -> DeviceError {
        warn!("tune command rejected");
        self.set_state(DeviceState::Tuning);
        self.set_state(DeviceState::Idle);
        DeviceError::TuneRejected
    }

    /// Tune a DVB-T transponder, searching the AUTO parameters the hardware
    /// cannot detect.
    pub fn auto_tune(&mut self, transponder: &Transponder) -> Result<(), DeviceError> {
        let Transponder::DvbT(dvb_t) = transponder else {
            warn!("can't handle != DVB-T");
            return Err(DeviceError::InvalidState("auto tuning requires DVB-T"));
        };

        let state = AutoTuneState::new(*dvb_t, self.backend.capabilities());
        let first = Transponder::DvbT(*state.transponder());
        self.auto_tune = Some(state);
        self.start_tune(&first)
    }

    /// Tune with a blind search when a DVB-T transponder leaves parameters
    /// to the receiver, plainly otherwise.
    pub fn tune_device(&mut self, transponder: &Transponder) -> Result<(), DeviceError> {
        match transponder.as_dvb_t() {
            Some(dvb_t) if dvb_t.has_auto_parameters() => self.auto_tune(transponder),
            _ => self.tune(transponder),
        }
    }

    /// Parameters of the current blind search attempt.
    pub fn auto_transponder(&self) -> Option<Transponder> {
        self.auto_tune
            .as_ref()
            .map(|state| Transponder::DvbT(*state.transponder()))
    }

    /// Whether a tune is waiting for the frontend.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Check the frontend; call every [`FRONTEND_POLL_INTERVAL`].
    pub fn poll_frontend(&mut self) {
        if !self.polling {
            return;
        }

        if self.backend.is_tuned() {
            debug!("tuning succeeded");
            self.polling = false;
            self.set_state(DeviceState::Tuned);
            return;
        }

        self.frontend_timeout -= FRONTEND_POLL_INTERVAL.as_millis() as i32;

        if self.frontend_timeout > 0 {
            return;
        }

        self.polling = false;

        let Some(auto_tune) = self.auto_tune.as_mut() else {
            warn!("tuning failed");
            self.set_state(DeviceState::Idle);
            return;
        };

        if let Some(signal) = self.backend.signal() {
            if signal < MIN_AUTO_TUNE_SIGNAL {
                warn!("tuning failed: signal too weak ({}%)", signal);
                self.set_state(DeviceState::Idle);
                return;
            }
        }

        if !auto_tune.advance() {
            warn!("tuning failed: no parameter combination left");
            self.set_state(DeviceState::Idle);
            return;
        }

        let next = Transponder::DvbT(*auto_tune.transponder());
        debug!("trying {}", next);
        if self.start_tune(&next).is_err() {
            self.auto_tune = None;
        }
    }

    pub fn is_tuned(&mut self) -> bool {
        self.backend.is_tuned()
    }

    pub fn signal(&mut self) -> Option<u8> {
        self.backend.signal()
    }

    pub fn snr(&mut self) -> Option<u8> {
        self.backend.snr()
    }

    pub fn discard_buffers(&self) {
        self.channel.discard();
    }

    pub fn add_pid_filter(
        &mut self,
        pid: u16,
        filter: Box<dyn PidFilter>,
    ) -> Result<FilterId, DeviceError> {
        self.dispatcher.add_pid_filter(pid, filter, &mut self.backend)
    }

    pub fn remove_pid_filter(&mut self, pid: u16, id: FilterId) -> Result<(), DeviceError> {
        self.dispatcher.remove_pid_filter(pid, id, &mut self.backend)
    }

    pub fn add_section_filter(
        &mut self,
        pid: u16,
        filter: Box<dyn SectionFilter>,
    ) -> Result<FilterId, DeviceError> {
        self.dispatcher
            .add_section_filter(pid, filter, &mut self.backend)
    }

    pub fn remove_section_filter(&mut self, pid: u16, id: FilterId) -> Result<(), DeviceError> {
        self.dispatcher
            .remove_section_filter(pid, id, &mut self.backend)
    }

    /// Write every packet of every filtered PID to `path`.
    pub fn enable_dump(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        if self.dispatcher.dumper().is_some() {
            return Ok(());
        }

        let dumper = PacketDumper::create(path)?;
        self.dispatcher.enable_dump(dumper);
        Ok(())
    }

    pub fn dispatcher(&self) -> &PidDispatcher {
        &self.dispatcher
    }

    /// Compact removed filters, then dispatch every queued packet. Returns
    /// the number of packets processed.
    pub fn process_pending(&mut self) -> usize {
        self.dispatcher.cleanup();

        let Self {
            channel,
            dispatcher,
            backend,
            ..
        } = self;

        channel.drain(|packet| dispatcher.dispatch(packet, &mut *backend))
    }

    /// Start descrambling the service of a PMT section on behalf of `user`.
    pub fn start_descrambling(&mut self, pmt_section: &[u8], user: u64) {
        let service_id = match PsiSection::parse(pmt_section) {
            Ok(section) => section.header.table_id_extension,
            Err(e) => {
                warn!("invalid PMT section: {}", e);
                return;
            }
        };

        let users = self.descrambling.entry(service_id).or_default();

        if users.is_empty() {
            self.backend.start_descrambling(pmt_section);
        }

        if !users.contains(&user) {
            users.push(user);
        }
    }

    pub fn stop_descrambling(&mut self, service_id: u16, user: u64) {
        let Some(users) = self.descrambling.get_mut(&service_id) else {
            warn!("service has not been started");
            return;
        };

        let Some(index) = users.iter().position(|u| *u == user) else {
            warn!("service has not been started");
            return;
        };

        users.remove(index);

        if users.is_empty() {
            self.descrambling.remove(&service_id);
            self.backend.stop_descrambling(service_id);
        }
    }
}
