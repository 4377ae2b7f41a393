//! Scriptable backend recording every command it receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dvbscan_protocol::{TransmissionType, Transponder};

use super::backend::{Capabilities, DeviceBackend, SecBurst, SecTone, SecVoltage};
use crate::demux::DataChannel;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Acquire,
    Release,
    Tone(SecTone),
    Voltage(SecVoltage),
    Message(Vec<u8>),
    Burst(SecBurst),
    Tune(Transponder),
    AddPid(u16),
    RemovePid(u16),
    StartDescrambling(Vec<u8>),
    StopDescrambling(u16),
}

impl BackendCall {
    /// Whether the call is an LNB, DiSEqC or rotor command.
    pub fn is_sec(&self) -> bool {
        matches!(
            self,
            BackendCall::Tone(_)
                | BackendCall::Voltage(_)
                | BackendCall::Message(_)
                | BackendCall::Burst(_)
        )
    }
}

pub struct MockBackend {
    calls: Vec<BackendCall>,
    pub transmission_types: Vec<TransmissionType>,
    pub capabilities: Capabilities,
    pub acquire_ok: bool,
    /// Results of upcoming tune commands; accepted once exhausted.
    pub tune_results: VecDeque<bool>,
    /// Whether the frontend locks after an accepted tune.
    pub lock_on_tune: bool,
    pub tuned: bool,
    pub signal: Option<u8>,
    pub snr: Option<u8>,
    rejected_pids: Vec<u16>,
    /// Frequency of the last accepted tune, shared with test producers.
    tuned_frequency: Arc<Mutex<Option<u32>>>,
    channel: Option<DataChannel>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            transmission_types: vec![TransmissionType::DvbT],
            capabilities: Capabilities::NONE,
            acquire_ok: true,
            tune_results: VecDeque::new(),
            lock_on_tune: true,
            tuned: false,
            signal: None,
            snr: Some(80),
            rejected_pids: Vec::new(),
            tuned_frequency: Arc::default(),
            channel: None,
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.clone()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn tunes(&self) -> Vec<Transponder> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Tune(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn reject_pid(&mut self, pid: u16) {
        self.rejected_pids.push(pid);
    }

    pub fn tuned_frequency(&self) -> Arc<Mutex<Option<u32>>> {
        self.tuned_frequency.clone()
    }

    pub fn data_channel(&self) -> Option<&DataChannel> {
        self.channel.as_ref()
    }
}

impl DeviceBackend for MockBackend {
    fn device_id(&self) -> String {
        "mock:0".to_string()
    }

    fn frontend_name(&self) -> String {
        "Mock Frontend".to_string()
    }

    fn transmission_types(&self) -> Vec<TransmissionType> {
        self.transmission_types.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn set_data_channel(&mut self, channel: DataChannel) {
        self.channel = Some(channel);
    }

    fn acquire(&mut self) -> bool {
        self.calls.push(BackendCall::Acquire);
        self.acquire_ok
    }

    fn release(&mut self) {
        self.calls.push(BackendCall::Release);
        *self.tuned_frequency.lock().unwrap() = None;
    }

    fn set_tone(&mut self, tone: SecTone) {
        self.calls.push(BackendCall::Tone(tone));
    }

    fn set_voltage(&mut self, voltage: SecVoltage) {
        self.calls.push(BackendCall::Voltage(voltage));
    }

    fn send_message(&mut self, message: &[u8]) {
        self.calls.push(BackendCall::Message(message.to_vec()));
    }

    fn send_burst(&mut self, burst: SecBurst) {
        self.calls.push(BackendCall::Burst(burst));
    }

    fn tune(&mut self, transponder: &Transponder) -> bool {
        self.calls.push(BackendCall::Tune(*transponder));
        let accepted = self.tune_results.pop_front().unwrap_or(true);
        self.tuned = accepted && self.lock_on_tune;
        *self.tuned_frequency.lock().unwrap() = accepted.then(|| transponder.frequency());
        accepted
    }

    fn signal(&mut self) -> Option<u8> {
        self.signal
    }

    fn snr(&mut self) -> Option<u8> {
        self.snr
    }

    fn is_tuned(&mut self) -> bool {
        self.tuned
    }

    fn add_pid_filter(&mut self, pid: u16) -> bool {
        self.calls.push(BackendCall::AddPid(pid));
        !self.rejected_pids.contains(&pid)
    }

    fn remove_pid_filter(&mut self, pid: u16) {
        self.calls.push(BackendCall::RemovePid(pid));
    }

    fn start_descrambling(&mut self, pmt_section: &[u8]) {
        self.calls
            .push(BackendCall::StartDescrambling(pmt_section.to_vec()));
    }

    fn stop_descrambling(&mut self, service_id: u16) {
        self.calls.push(BackendCall::StopDescrambling(service_id));
    }
}
