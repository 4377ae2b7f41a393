//! Control loop running a scan on a device.
//!
//! Everything runs on one task: packet dispatch when the backend signals
//! data, frontend polling every [`FRONTEND_POLL_INTERVAL`], and the scan
//! reacting to both.

use dvbscan_protocol::{ChannelCandidate, Transponder};
use log::info;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::device::{DeviceBackend, DvbDevice, FRONTEND_POLL_INTERVAL};
use crate::scan::{DvbScan, ScanNotice};

/// Result of [`run_scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub channels: Vec<ChannelCandidate>,
    /// Final transponder list of an offline scan.
    pub transponders: Vec<Transponder>,
    pub cancelled: bool,
}

/// Drive `scan` until it finishes or `cancel` fires.
///
/// Dropping the cancel sender without sending lets the scan run to its end.
pub async fn run_scan<B: DeviceBackend>(
    device: &mut DvbDevice<B>,
    mut scan: DvbScan,
    mut notices: UnboundedReceiver<ScanNotice>,
    mut cancel: oneshot::Receiver<()>,
) -> ScanOutcome {
    let channel = device.data_channel().clone();
    let mut states = device.subscribe();
    let mut ticker = time::interval(FRONTEND_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cancel_open = true;
    let mut outcome = ScanOutcome::default();

    scan.start(device, Instant::now());

    loop {
        while let Ok(notice) = notices.try_recv() {
            match notice {
                ScanNotice::FoundChannels(channels) => {
                    for channel in &channels {
                        info!(
                            "found channel {:?} (service {}) on {}",
                            channel.name, channel.service_id, channel.transponder
                        );
                    }
                    outcome.channels.extend(channels);
                }
                ScanNotice::Finished => {
                    info!("scan finished: {} channels", outcome.channels.len());
                    outcome.transponders = scan.transponders().to_vec();
                    return outcome;
                }
            }
        }

        tokio::select! {
            _ = channel.notified() => {}
            _ = ticker.tick() => device.poll_frontend(),
            result = &mut cancel, if cancel_open => {
                if result.is_ok() {
                    info!("scan cancelled");
                    scan.abort(device);
                    outcome.transponders = scan.transponders().to_vec();
                    outcome.cancelled = true;
                    return outcome;
                }
                cancel_open = false;
            }
        }

        let now = Instant::now();

        // Filters started for a new state must see the data queued with it
        if states.has_changed().unwrap_or(false) {
            states.borrow_and_update();
            scan.device_state_changed(device, now);
        }

        device.process_pending();
        scan.process_events(device, now);
        scan.check_timeouts(device, now);
    }
}
