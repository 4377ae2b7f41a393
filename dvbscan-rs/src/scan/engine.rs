//! Channel scan state machine.
//!
//! For each transponder the scan collects the PAT, the NIT (offline scans
//! only), the SDT and then the PMT of every program, using at most
//! [`MAX_FILTERS`] section filters at a time. Channels with at least one
//! media stream are reported once the transponder is complete. An offline
//! scan then tunes the next transponder of its list, which the NIT may
//! have extended; a live scan stops after the current one.

use dvbscan_protocol::{
    ChannelCandidate, DeviceState, DvbSTransponder, ScanState, TransmissionType, Transponder,
};
use log::{debug, info, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use super::filter::{FilterType, ScanEvent, ScanEventKind, ScanFilter, Table};
use crate::demux::FilterId;
use crate::device::{DeviceBackend, DvbDevice};
use crate::ts_analyzer::{
    descriptor_tag, pid, NitTable, PatEntry, PmtTable, SatelliteDeliveryDescriptor, SdtTable,
};

/// Section filters a scan keeps open at most.
pub const MAX_FILTERS: usize = 10;

/// Progress reported to the scan owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanNotice {
    /// Channels of one transponder.
    FoundChannels(Vec<ChannelCandidate>),
    /// The scan is over; nothing follows.
    Finished,
}

struct FilterSlot {
    filter_type: FilterType,
    pid: u16,
    /// Registration while the slot is in use.
    id: Option<FilterId>,
    generation: u64,
    deadline: Instant,
}

#[derive(Debug, Clone)]
struct ServiceEntry {
    service_id: u16,
    network_id: u16,
    transport_stream_id: u16,
    scrambled: bool,
    name: String,
    provider: String,
}

pub struct DvbScan {
    source: String,
    live: bool,
    state: ScanState,
    transponders: Vec<Transponder>,
    next_transponder: usize,
    /// Transponder being scanned.
    transponder: Option<Transponder>,
    /// Signal quality when the PAT was requested.
    snr: Option<u8>,
    pat_entries: Vec<PatEntry>,
    /// Next PAT entry without a PMT filter.
    pat_index: usize,
    services: Vec<ServiceEntry>,
    channels: Vec<ChannelCandidate>,
    filters: Vec<FilterSlot>,
    active_filters: usize,
    generation: u64,
    events_tx: UnboundedSender<ScanEvent>,
    events_rx: UnboundedReceiver<ScanEvent>,
    notices: UnboundedSender<ScanNotice>,
    finished: bool,
}

impl DvbScan {
    /// Scan the transponder the device is currently tuned to.
    pub fn live(source: &str, transponder: Transponder) -> (Self, UnboundedReceiver<ScanNotice>) {
        Self::new(source, true, ScanState::Pat, Vec::new(), Some(transponder))
    }

    /// Tune and scan each of `transponders` in turn.
    pub fn offline(
        source: &str,
        transponders: Vec<Transponder>,
    ) -> (Self, UnboundedReceiver<ScanNotice>) {
        Self::new(source, false, ScanState::Tune, transponders, None)
    }

    fn new(
        source: &str,
        live: bool,
        state: ScanState,
        transponders: Vec<Transponder>,
        transponder: Option<Transponder>,
    ) -> (Self, UnboundedReceiver<ScanNotice>) {
        let (events_tx, events_rx) = unbounded_channel();
        let (notices, notices_rx) = unbounded_channel();

        let scan = Self {
            source: source.to_string(),
            live,
            state,
            transponders,
            next_transponder: 0,
            transponder,
            snr: None,
            pat_entries: Vec::new(),
            pat_index: 0,
            services: Vec::new(),
            channels: Vec::new(),
            filters: Vec::new(),
            active_filters: 0,
            generation: 0,
            events_tx,
            events_rx,
            notices,
            finished: false,
        };

        (scan, notices_rx)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Transponder list, including the ones learned from the NIT.
    pub fn transponders(&self) -> &[Transponder] {
        &self.transponders
    }

    pub fn active_filters(&self) -> usize {
        self.active_filters
    }

    /// Begin scanning. An offline scan first stops whatever the device
    /// is doing.
    pub fn start<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>, now: Instant) {
        if !self.live {
            device.stop();
        }
        self.update_state(device, now);
    }

    /// Advance as far as possible without waiting for data or the device.
    pub fn update_state<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>, now: Instant) {
        while !self.finished {
            match self.state {
                ScanState::Pat => {
                    if !self.start_table(device, pid::PAT, FilterType::Pat, now) {
                        return;
                    }
                    self.snr = device.snr();
                    self.state = ScanState::Nit;
                }
                ScanState::Nit => {
                    let has_nit = self
                        .transponder
                        .is_some_and(|t| t.transmission_type().has_nit());
                    if !self.live
                        && has_nit
                        && !self.start_table(device, pid::NIT, FilterType::Nit, now)
                    {
                        return;
                    }
                    self.state = ScanState::Sdt;
                }
                ScanState::Sdt => {
                    if !self.start_table(device, pid::SDT, FilterType::Sdt, now) {
                        return;
                    }
                    self.state = ScanState::Pmt;
                }
                ScanState::Pmt => {
                    while let Some(entry) = self.pat_entries.get(self.pat_index).copied() {
                        if !self.start_pmt(device, entry, now) {
                            return;
                        }
                        self.pat_index += 1;
                    }

                    if self.active_filters > 0 {
                        return;
                    }

                    self.transponder_done(device);
                }
                ScanState::Tune => match device.state() {
                    DeviceState::Idle => self.tune_next(device),
                    DeviceState::Tuned => {
                        if let Some(found) = device.auto_transponder() {
                            self.transponder = Some(found);
                        }
                        self.state = ScanState::Pat;
                    }
                    DeviceState::Tuning | DeviceState::RotorMoving => return,
                    DeviceState::Released | DeviceState::NotReady => {
                        warn!("device is not available, stopping scan");
                        self.finish();
                    }
                },
            }
        }
    }

    /// React to a change of the device state.
    pub fn device_state_changed<B: DeviceBackend>(
        &mut self,
        device: &mut DvbDevice<B>,
        now: Instant,
    ) {
        if self.finished {
            return;
        }

        match device.state() {
            DeviceState::NotReady | DeviceState::Released => {
                // The device has already dropped every filter
                warn!("device lost during scan");
                self.clear_filters();
                self.finish();
            }
            _ if self.state == ScanState::Tune => self.update_state(device, now),
            _ => {}
        }
    }

    /// Handle the sections and completions reported by the filters.
    pub fn process_events<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>, now: Instant) {
        while let Ok(event) = self.events_rx.try_recv() {
            let current = self
                .filters
                .get(event.slot)
                .is_some_and(|slot| slot.id.is_some() && slot.generation == event.generation);
            if !current {
                continue;
            }

            match event.kind {
                ScanEventKind::Table(table) => self.process_table(table),
                ScanEventKind::Finished => {
                    self.release_slot(event.slot);
                    self.update_state(device, now);
                }
            }
        }
    }

    /// Give up on filters whose table did not complete in time.
    pub fn check_timeouts<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>, now: Instant) {
        self.process_events(device, now);

        for index in 0..self.filters.len() {
            let slot = &self.filters[index];
            let Some(id) = slot.id else {
                continue;
            };
            if slot.deadline > now {
                continue;
            }

            warn!(
                "timeout while reading {:?} sections on pid {}",
                slot.filter_type, slot.pid
            );
            if let Err(e) = device.remove_section_filter(slot.pid, id) {
                debug!("{}", e);
            }
            self.release_slot(index);
            self.update_state(device, now);
        }
    }

    /// Stop the scan, removing its filters from the device.
    pub fn abort<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>) {
        for slot in &mut self.filters {
            if let Some(id) = slot.id.take() {
                if let Err(e) = device.remove_section_filter(slot.pid, id) {
                    debug!("{}", e);
                }
            }
        }
        self.active_filters = 0;
        self.finished = true;
    }

    /// Start a filter for a whole table. Returns false when the scan has to
    /// wait for a running filter to free its slot; a table that cannot be
    /// requested while nothing else runs is skipped.
    fn start_table<B: DeviceBackend>(
        &mut self,
        device: &mut DvbDevice<B>,
        pid: u16,
        filter_type: FilterType,
        now: Instant,
    ) -> bool {
        let filter =
            |slot, generation, events| ScanFilter::new(slot, generation, filter_type, pid, events);
        self.start_filter(device, pid, filter_type, now, filter)
    }

    fn start_pmt<B: DeviceBackend>(
        &mut self,
        device: &mut DvbDevice<B>,
        entry: PatEntry,
        now: Instant,
    ) -> bool {
        let filter = |slot, generation, events| {
            ScanFilter::new(slot, generation, FilterType::Pmt, entry.pid, events)
                .for_program(entry.program_number)
        };
        self.start_filter(device, entry.pid, FilterType::Pmt, now, filter)
    }

    fn start_filter<B, F>(
        &mut self,
        device: &mut DvbDevice<B>,
        pid: u16,
        filter_type: FilterType,
        now: Instant,
        make_filter: F,
    ) -> bool
    where
        B: DeviceBackend,
        F: FnOnce(usize, u64, UnboundedSender<ScanEvent>) -> ScanFilter,
    {
        let index = match self.filters.iter().position(|slot| slot.id.is_none()) {
            Some(index) => index,
            None if self.filters.len() < MAX_FILTERS => self.filters.len(),
            None => return false,
        };

        self.generation += 1;
        let filter = make_filter(index, self.generation, self.events_tx.clone());

        let id = match device.add_section_filter(pid, Box::new(filter)) {
            Ok(id) => id,
            Err(e) if self.active_filters > 0 => {
                debug!("cannot start {:?} filter yet: {}", filter_type, e);
                return false;
            }
            Err(e) => {
                warn!("skipping {:?} on pid {}: {}", filter_type, pid, e);
                return true;
            }
        };

        let slot = FilterSlot {
            filter_type,
            pid,
            id: Some(id),
            generation: self.generation,
            deadline: now + filter_type.timeout(),
        };
        if index == self.filters.len() {
            self.filters.push(slot);
        } else {
            self.filters[index] = slot;
        }
        self.active_filters += 1;
        true
    }

    fn release_slot(&mut self, index: usize) {
        if self.filters[index].id.take().is_some() {
            self.active_filters -= 1;
        }
    }

    fn clear_filters(&mut self) {
        for slot in &mut self.filters {
            slot.id = None;
        }
        self.active_filters = 0;
    }

    fn tune_next<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>) {
        let Some(next) = self.transponders.get(self.next_transponder).copied() else {
            info!("all transponders scanned");
            self.finish();
            return;
        };

        self.next_transponder += 1;
        info!(
            "scanning transponder {}/{}: {}",
            self.next_transponder,
            self.transponders.len(),
            next
        );
        self.transponder = Some(next);

        // A rejected tune leaves the device idle and the next one is tried
        if let Err(e) = device.tune_device(&next) {
            warn!("cannot tune {}: {}", next, e);
        }
    }

    fn transponder_done<B: DeviceBackend>(&mut self, device: &mut DvbDevice<B>) {
        self.merge_services();

        if !self.channels.is_empty() {
            info!("found {} channels", self.channels.len());
            let channels = std::mem::take(&mut self.channels);
            let _ = self.notices.send(ScanNotice::FoundChannels(channels));
        }

        if self.live {
            self.finish();
            return;
        }

        self.pat_entries.clear();
        self.pat_index = 0;
        self.services.clear();
        self.snr = None;
        device.stop();
        self.state = ScanState::Tune;
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            let _ = self.notices.send(ScanNotice::Finished);
        }
    }

    fn process_table(&mut self, table: Table) {
        match table {
            Table::Pat(pat) => {
                debug!(
                    "PAT of transport stream {}: {} programs",
                    pat.transport_stream_id,
                    pat.programs.len()
                );
                self.pat_entries.extend(pat.programs);
            }
            Table::Pmt { pid, table } => self.process_pmt(pid, &table),
            Table::Sdt(sdt) => self.process_sdt(&sdt),
            Table::Nit(nit) => self.process_nit(&nit),
        }
    }

    fn process_pmt(&mut self, pmt_pid: u16, pmt: &PmtTable) {
        let Some(transponder) = self.transponder else {
            return;
        };

        let mut channel =
            ChannelCandidate::new(&self.source, pmt.program_number, pmt_pid, transponder);
        channel.video_pid = pmt.video_pid();
        channel.audio_pids = pmt.audio_pids();

        if !channel.has_media() {
            debug!("program {} has no audio or video", pmt.program_number);
            return;
        }

        channel.snr = self.snr;
        self.channels.push(channel);
    }

    fn process_sdt(&mut self, sdt: &SdtTable) {
        for service in &sdt.services {
            self.services.push(ServiceEntry {
                service_id: service.service_id,
                network_id: sdt.original_network_id,
                transport_stream_id: sdt.transport_stream_id,
                scrambled: service.scrambled,
                name: service.name().unwrap_or_default().to_string(),
                provider: service.provider().unwrap_or_default().to_string(),
            });
        }
    }

    fn process_nit(&mut self, nit: &NitTable) {
        let Some(kind) = self.transponder.map(|t| t.transmission_type()) else {
            return;
        };

        for stream in &nit.transport_streams {
            for (tag, data) in stream.descriptors() {
                match (kind, tag) {
                    (
                        TransmissionType::DvbS | TransmissionType::DvbS2,
                        descriptor_tag::SATELLITE_DELIVERY,
                    ) => {
                        match SatelliteDeliveryDescriptor::parse(data) {
                            Ok(descriptor) => self.add_satellite_transponder(&descriptor),
                            Err(e) => debug!("{}", e),
                        }
                        break;
                    }
                    (TransmissionType::DvbC, descriptor_tag::CABLE_DELIVERY)
                    | (TransmissionType::DvbT, descriptor_tag::TERRESTRIAL_DELIVERY) => break,
                    _ => {}
                }
            }
        }
    }

    fn add_satellite_transponder(&mut self, descriptor: &SatelliteDeliveryDescriptor) {
        if descriptor.is_dvb_s2() {
            debug!("skipping DVB-S2 transponder {} kHz", descriptor.frequency);
            return;
        }

        let transponder = DvbSTransponder {
            frequency: descriptor.frequency,
            polarization: descriptor.polarization(),
            symbol_rate: descriptor.symbol_rate,
            fec_rate: descriptor.fec_rate(),
        };

        let known = self
            .transponders
            .iter()
            .chain(self.transponder.iter())
            .filter_map(Transponder::satellite_params)
            .any(|(frequency, polarization)| {
                frequency == transponder.frequency && polarization == transponder.polarization
            });

        if !known {
            let transponder = Transponder::DvbS(transponder);
            info!("new transponder from NIT: {}", transponder);
            self.transponders.push(transponder);
        }
    }

    /// Copy the SDT service descriptions onto the channels.
    fn merge_services(&mut self) {
        for service in &self.services {
            for channel in self
                .channels
                .iter_mut()
                .filter(|c| c.service_id == service.service_id)
            {
                channel.network_id = Some(service.network_id);
                channel.transport_stream_id = Some(service.transport_stream_id);
                channel.scrambled = service.scrambled;
                if !service.name.is_empty() {
                    channel.name = service.name.clone();
                }
                channel.provider = service.provider.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DvbConfig;
    use crate::device::testing::{BackendCall, MockBackend};
    use crate::scan::testing::{
        channel_one, nit, pat, pmt, satellite_delivery, terrestrial_delivery, Carousel,
    };
    use dvbscan_protocol::{
        Bandwidth, DvbTTransponder, FecRate, GuardInterval, Hierarchy, Modulation, Polarization,
        TransmissionMode,
    };
    use std::time::Duration;

    fn dvb_t(frequency: u32) -> Transponder {
        Transponder::DvbT(DvbTTransponder {
            frequency,
            bandwidth: Bandwidth::Bandwidth8Mhz,
            fec_rate_high: FecRate::Fec2_3,
            fec_rate_low: FecRate::None,
            modulation: Modulation::Qam64,
            transmission_mode: TransmissionMode::Mode8k,
            guard_interval: GuardInterval::Interval1_8,
            hierarchy: Hierarchy::None,
        })
    }

    fn dvb_s(frequency: u32, polarization: Polarization) -> Transponder {
        Transponder::DvbS(DvbSTransponder {
            frequency,
            polarization,
            symbol_rate: 27_500_000,
            fec_rate: FecRate::Fec3_4,
        })
    }

    fn device(backend: MockBackend) -> DvbDevice<MockBackend> {
        let mut device = DvbDevice::new(backend);
        device.set_settle_delay(Duration::ZERO);
        device.acquire(DvbConfig::default()).unwrap();
        device
    }

    fn tuned_device(transponder: &Transponder) -> DvbDevice<MockBackend> {
        let mut device = device(MockBackend::new());
        device.tune(transponder).unwrap();
        device.poll_frontend();
        assert_eq!(device.state(), DeviceState::Tuned);
        device
    }

    /// Deliver one repetition of `carousel` and let the scan react.
    fn deliver(
        scan: &mut DvbScan,
        device: &mut DvbDevice<MockBackend>,
        carousel: &mut Carousel,
        now: Instant,
    ) {
        carousel.feed(device.data_channel());
        device.process_pending();
        scan.process_events(device, now);
    }

    /// Poll the frontend once and forward the state change.
    fn poll(scan: &mut DvbScan, device: &mut DvbDevice<MockBackend>, now: Instant) {
        device.poll_frontend();
        scan.device_state_changed(device, now);
    }

    fn notices(rx: &mut UnboundedReceiver<ScanNotice>) -> Vec<ScanNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            notices.push(notice);
        }
        notices
    }

    #[test]
    fn test_live_scan() {
        let transponder = dvb_t(474_000_000);
        let mut device = tuned_device(&transponder);
        let (mut scan, mut rx) = DvbScan::live("T-test", transponder);
        let now = Instant::now();

        scan.start(&mut device, now);
        // PAT and SDT; no NIT on a live scan
        assert_eq!(scan.active_filters(), 2);
        assert_eq!(scan.state(), ScanState::Pmt);
        assert_eq!(device.dispatcher().active_section_filters(pid::NIT), 0);

        let mut carousel = channel_one();
        deliver(&mut scan, &mut device, &mut carousel, now);
        // The PMT filter starts once the PAT is complete
        assert_eq!(scan.active_filters(), 1);
        assert!(notices(&mut rx).is_empty());

        deliver(&mut scan, &mut device, &mut carousel, now);
        assert!(scan.is_finished());

        let notices = notices(&mut rx);
        assert_eq!(notices.len(), 2);
        let ScanNotice::FoundChannels(channels) = &notices[0] else {
            panic!("expected channels");
        };
        assert_eq!(channels.len(), 1);
        let channel = &channels[0];
        assert_eq!(channel.name, "Channel One");
        assert_eq!(channel.provider, "ACME");
        assert_eq!(channel.source, "T-test");
        assert_eq!(channel.service_id, 100);
        assert_eq!(channel.network_id, Some(0x2114));
        assert_eq!(channel.transport_stream_id, Some(1));
        assert_eq!(channel.video_pid, Some(0x100));
        assert_eq!(channel.audio_pids, vec![0x101]);
        assert_eq!(channel.pmt_pid, 0x200);
        assert_eq!(channel.transponder, transponder);
        assert_eq!(channel.snr, Some(80));
        assert!(!channel.scrambled);
        assert_eq!(notices[1], ScanNotice::Finished);

        // The live scan leaves the device tuned
        assert_eq!(device.state(), DeviceState::Tuned);
    }

    #[test]
    fn test_channels_without_media_or_sdt() {
        let transponder = dvb_t(474_000_000);
        let mut device = tuned_device(&transponder);
        let (mut scan, mut rx) = DvbScan::live("T-test", transponder);
        let now = Instant::now();
        scan.start(&mut device, now);

        let mut carousel = Carousel::new();
        carousel
            .add(0, pat(1, &[(100, 0x200), (101, 0x201)]))
            .add(0x200, pmt(100, &[(0x04, 0x110)]))
            // Data only
            .add(0x201, pmt(101, &[(0x06, 0x120)]));
        deliver(&mut scan, &mut device, &mut carousel, now);
        deliver(&mut scan, &mut device, &mut carousel, now);
        assert_eq!(scan.active_filters(), 1);

        // The SDT never arrives
        scan.check_timeouts(&mut device, now + Duration::from_secs(6));
        assert!(scan.is_finished());

        let notices = notices(&mut rx);
        let ScanNotice::FoundChannels(channels) = &notices[0] else {
            panic!("expected channels");
        };
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "[100]");
        assert_eq!(channels[0].video_pid, None);
        assert_eq!(channels[0].audio_pids, vec![0x110]);
        assert_eq!(channels[0].network_id, None);
    }

    #[test]
    fn test_empty_transponder_times_out() {
        let transponder = dvb_t(474_000_000);
        let mut device = tuned_device(&transponder);
        let (mut scan, mut rx) = DvbScan::live("T-test", transponder);
        let now = Instant::now();
        scan.start(&mut device, now);

        scan.check_timeouts(&mut device, now + Duration::from_secs(4));
        assert_eq!(scan.active_filters(), 2);

        scan.check_timeouts(&mut device, now + Duration::from_secs(5));
        assert_eq!(scan.active_filters(), 0);
        assert_eq!(notices(&mut rx), vec![ScanNotice::Finished]);
        assert_eq!(device.dispatcher().active_section_filters(pid::PAT), 0);
    }

    #[test]
    fn test_filter_pool_bounded() {
        let transponder = dvb_t(474_000_000);
        let mut device = tuned_device(&transponder);
        let (mut scan, mut rx) = DvbScan::live("T-test", transponder);
        let now = Instant::now();
        scan.start(&mut device, now);

        let programs: Vec<(u16, u16)> = (1..=12).map(|n| (n, 0x200 + n)).collect();
        let mut carousel = Carousel::new();
        carousel.add(0, pat(1, &programs));
        for &(program, pmt_pid) in &programs {
            carousel.add(pmt_pid, pmt(program, &[(0x02, 0x300 + program)]));
        }

        // PAT done: SDT plus nine PMT filters
        carousel.feed(device.data_channel());
        device.process_pending();
        scan.process_events(&mut device, now);
        assert_eq!(scan.active_filters(), MAX_FILTERS);

        // The PMTs delivered with the PAT predate their filters
        deliver(&mut scan, &mut device, &mut carousel, now);
        assert_eq!(scan.active_filters(), 4);
        deliver(&mut scan, &mut device, &mut carousel, now);
        assert_eq!(scan.active_filters(), 1);

        scan.check_timeouts(&mut device, now + Duration::from_secs(5));
        let notices = notices(&mut rx);
        let ScanNotice::FoundChannels(channels) = &notices[0] else {
            panic!("expected channels");
        };
        let mut ids: Vec<u16> = channels.iter().map(|c| c.service_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_offline_scan() {
        let first = dvb_t(474_000_000);
        let second = dvb_t(482_000_000);
        let mut backend = MockBackend::new();
        backend.tune_results = [true, false].into();
        let mut device = device(backend);

        let (mut scan, mut rx) = DvbScan::offline("T-test", vec![first, second]);
        let now = Instant::now();
        scan.start(&mut device, now);
        assert_eq!(scan.state(), ScanState::Tune);
        assert_eq!(device.state(), DeviceState::Tuning);

        poll(&mut scan, &mut device, now);
        // PAT, NIT and SDT
        assert_eq!(scan.active_filters(), 3);

        let mut carousel = channel_one();
        carousel.add(pid::NIT, nit(0x2114, &[(1, terrestrial_delivery(474_000_000))]));
        deliver(&mut scan, &mut device, &mut carousel, now);
        deliver(&mut scan, &mut device, &mut carousel, now);

        // The second tune is rejected, which ends the list
        assert!(scan.is_finished());
        assert_eq!(device.backend().tunes(), vec![first, second]);
        assert_eq!(scan.transponders().len(), 2);

        let notices = notices(&mut rx);
        assert_eq!(notices.len(), 2);
        let ScanNotice::FoundChannels(channels) = &notices[0] else {
            panic!("expected channels");
        };
        assert_eq!(channels[0].transponder, first);
        assert_eq!(notices[1], ScanNotice::Finished);
    }

    #[test]
    fn test_offline_scan_waits_for_nit() {
        let mut device = device(MockBackend::new());
        let (mut scan, mut rx) = DvbScan::offline("T-test", vec![dvb_t(474_000_000)]);
        let now = Instant::now();
        scan.start(&mut device, now);
        poll(&mut scan, &mut device, now);

        scan.check_timeouts(&mut device, now + Duration::from_secs(6));
        assert_eq!(scan.active_filters(), 1);
        assert!(!scan.is_finished());

        scan.check_timeouts(&mut device, now + Duration::from_secs(20));
        assert!(scan.is_finished());
        assert_eq!(notices(&mut rx), vec![ScanNotice::Finished]);
        assert_eq!(device.state(), DeviceState::Idle);
    }

    #[test]
    fn test_nit_extends_satellite_list() {
        let mut backend = MockBackend::new();
        backend.transmission_types = vec![TransmissionType::DvbS];
        // Transponders learned from the NIT are rejected
        backend.tune_results = [true, false, false].into();
        let mut device = device(backend);

        let start = dvb_s(11_778_000, Polarization::Vertical);
        let (mut scan, mut rx) = DvbScan::offline("S19.2E", vec![start]);
        let now = Instant::now();
        scan.start(&mut device, now);
        poll(&mut scan, &mut device, now);

        let mut carousel = Carousel::new();
        carousel.add(0, pat(1, &[])).add(
            pid::NIT,
            nit(
                1,
                &[
                    (1, satellite_delivery(11_778_000, 1, 27_500_000, false)),
                    (2, satellite_delivery(12_188_000, 0, 27_500_000, false)),
                    (3, satellite_delivery(12_480_000, 1, 27_500_000, true)),
                    // Same frequency, other polarization
                    (4, satellite_delivery(11_778_000, 0, 22_000_000, false)),
                ],
            ),
        );
        deliver(&mut scan, &mut device, &mut carousel, now);
        scan.check_timeouts(&mut device, now + Duration::from_secs(5));

        assert!(scan.is_finished());
        assert_eq!(
            scan.transponders(),
            &[
                start,
                dvb_s(12_188_000, Polarization::Horizontal),
                Transponder::DvbS(DvbSTransponder {
                    frequency: 11_778_000,
                    polarization: Polarization::Horizontal,
                    symbol_rate: 22_000_000,
                    fec_rate: FecRate::Fec3_4,
                }),
            ]
        );
        assert_eq!(device.backend().tunes().len(), 3);
        assert_eq!(notices(&mut rx), vec![ScanNotice::Finished]);
    }

    #[test]
    fn test_device_lost() {
        let mut device = device(MockBackend::new());
        let (mut scan, mut rx) = DvbScan::offline("T-test", vec![dvb_t(474_000_000)]);
        let now = Instant::now();
        scan.start(&mut device, now);
        poll(&mut scan, &mut device, now);
        assert_eq!(scan.active_filters(), 3);

        device.mark_not_ready();
        scan.device_state_changed(&mut device, now);
        assert!(scan.is_finished());
        assert_eq!(scan.active_filters(), 0);
        assert_eq!(notices(&mut rx), vec![ScanNotice::Finished]);
    }

    #[test]
    fn test_abort_removes_filters() {
        let transponder = dvb_t(474_000_000);
        let mut device = tuned_device(&transponder);
        let (mut scan, mut rx) = DvbScan::live("T-test", transponder);
        scan.start(&mut device, Instant::now());
        device.backend_mut().clear_calls();

        scan.abort(&mut device);
        assert!(scan.is_finished());
        let calls = device.backend().calls();
        assert!(calls.contains(&BackendCall::RemovePid(pid::PAT)));
        assert!(calls.contains(&BackendCall::RemovePid(pid::SDT)));
        assert!(notices(&mut rx).is_empty());
    }

    #[test]
    fn test_stale_events_ignored() {
        let transponder = dvb_t(474_000_000);
        let mut device = tuned_device(&transponder);
        let (mut scan, mut rx) = DvbScan::live("T-test", transponder);
        let now = Instant::now();
        scan.start(&mut device, now);

        // A filter that lost its slot to a timeout
        let mut late = ScanFilter::new(0, 99, FilterType::Pat, 0, scan.events_tx.clone());
        let mut control = crate::demux::FilterControl::default();
        crate::demux::SectionFilter::process_section(
            &mut late,
            &pat(1, &[(5, 0x205)]),
            true,
            &mut control,
        );
        scan.process_events(&mut device, now);

        assert!(scan.pat_entries.is_empty());
        assert_eq!(scan.active_filters(), 2);
        assert!(notices(&mut rx).is_empty());
    }
}
