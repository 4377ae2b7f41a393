//! Device backend replaying a recorded transport stream.
//!
//! Every tune is accepted and locks immediately; the recording is then
//! played in a loop on a reader thread, whatever the transponder. Satellite
//! equipment commands and hardware pid filters are accepted and only logged.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dvbscan::demux::{DataChannel, BUFFER_SIZE};
use dvbscan::device::{Capabilities, DeviceBackend, SecBurst, SecTone, SecVoltage};
use dvbscan::ts_analyzer::{SYNC_BYTE, TS_PACKET_SIZE};
use dvbscan_protocol::{TransmissionType, Transponder};
use log::{debug, info, warn};

/// Delay between two buffers, roughly the rate of a 60 Mbit/s multiplex.
const BUFFER_INTERVAL: Duration = Duration::from_millis(2);

pub struct ReplayBackend {
    path: PathBuf,
    channel: Option<DataChannel>,
    is_running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    tuned: bool,
}

impl ReplayBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            channel: None,
            is_running: Arc::new(AtomicBool::new(false)),
            reader: None,
            tuned: false,
        }
    }

    fn stop_reader(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("[Replay] Reader thread panicked");
            }
        }
    }

    fn start_reader(&mut self) -> io::Result<()> {
        let Some(channel) = self.channel.clone() else {
            return Err(io::Error::new(io::ErrorKind::Other, "no data channel"));
        };
        let file = File::open(&self.path)?;

        let is_running = Arc::new(AtomicBool::new(true));
        self.is_running = is_running.clone();
        let path = self.path.clone();
        self.reader = Some(std::thread::spawn(move || {
            if let Err(e) = run_reader(file, &path, &channel, &is_running) {
                warn!("[Replay] Reading {} failed: {}", path.display(), e);
            }
            is_running.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }
}

impl Drop for ReplayBackend {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

/// Offset of the first packet start, confirmed by the following sync byte.
fn find_sync(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(TS_PACKET_SIZE))
        .find(|&i| data[i] == SYNC_BYTE && data[i + TS_PACKET_SIZE] == SYNC_BYTE)
}

fn run_reader(
    mut file: File,
    path: &Path,
    channel: &DataChannel,
    is_running: &AtomicBool,
) -> io::Result<()> {
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    let Some(start) = find_sync(&contents) else {
        warn!("[Replay] No transport stream found in {}", path.display());
        return Ok(());
    };
    let packets = &contents[start..];
    let usable = packets.len() - packets.len() % TS_PACKET_SIZE;
    let packets = &packets[..usable];
    info!(
        "[Replay] Playing {} packets from {}",
        usable / TS_PACKET_SIZE,
        path.display()
    );

    let mut offset = 0;
    let mut loops = 0u64;
    while is_running.load(Ordering::SeqCst) {
        let mut buffer = channel.get_buffer();
        let size = BUFFER_SIZE.min(packets.len() - offset);
        buffer.data_mut()[..size].copy_from_slice(&packets[offset..offset + size]);
        buffer.set_size(size);
        channel.write_buffer(buffer);

        offset += size;
        if offset >= packets.len() {
            offset = 0;
            loops += 1;
            debug!("[Replay] Restarting recording (loop {})", loops);
        }
        std::thread::sleep(BUFFER_INTERVAL);
    }

    Ok(())
}

impl DeviceBackend for ReplayBackend {
    fn device_id(&self) -> String {
        format!("replay:{}", self.path.display())
    }

    fn frontend_name(&self) -> String {
        "Transport stream replay".to_string()
    }

    fn transmission_types(&self) -> Vec<TransmissionType> {
        vec![
            TransmissionType::DvbC,
            TransmissionType::DvbS,
            TransmissionType::DvbS2,
            TransmissionType::DvbT,
        ]
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DVB_T_FEC_AUTO
            | Capabilities::DVB_T_GUARD_INTERVAL_AUTO
            | Capabilities::DVB_T_MODULATION_AUTO
            | Capabilities::DVB_T_TRANSMISSION_MODE_AUTO
    }

    fn set_data_channel(&mut self, channel: DataChannel) {
        self.channel = Some(channel);
    }

    fn acquire(&mut self) -> bool {
        match File::open(&self.path) {
            Ok(_) => true,
            Err(e) => {
                warn!("[Replay] Cannot open {}: {}", self.path.display(), e);
                false
            }
        }
    }

    fn release(&mut self) {
        self.stop_reader();
        self.tuned = false;
    }

    fn set_tone(&mut self, tone: SecTone) {
        debug!("[Replay] tone {:?}", tone);
    }

    fn set_voltage(&mut self, voltage: SecVoltage) {
        debug!("[Replay] voltage {}", voltage);
    }

    fn send_message(&mut self, message: &[u8]) {
        debug!("[Replay] DiSEqC message {:02X?}", message);
    }

    fn send_burst(&mut self, burst: SecBurst) {
        debug!("[Replay] burst {:?}", burst);
    }

    fn tune(&mut self, transponder: &Transponder) -> bool {
        self.stop_reader();
        info!("[Replay] Tuning {}", transponder);
        match self.start_reader() {
            Ok(()) => {
                self.tuned = true;
                true
            }
            Err(e) => {
                warn!("[Replay] Cannot start reader: {}", e);
                self.tuned = false;
                false
            }
        }
    }

    fn signal(&mut self) -> Option<u8> {
        self.tuned.then_some(100)
    }

    fn snr(&mut self) -> Option<u8> {
        self.tuned.then_some(90)
    }

    fn is_tuned(&mut self) -> bool {
        self.tuned
    }

    fn add_pid_filter(&mut self, pid: u16) -> bool {
        debug!("[Replay] add pid 0x{:04X}", pid);
        true
    }

    fn remove_pid_filter(&mut self, pid: u16) {
        debug!("[Replay] remove pid 0x{:04X}", pid);
    }

    fn start_descrambling(&mut self, pmt_section: &[u8]) {
        debug!("[Replay] descrambling requested ({} byte PMT)", pmt_section.len());
    }

    fn stop_descrambling(&mut self, service_id: u16) {
        debug!("[Replay] descrambling stopped for service {}", service_id);
    }
}
