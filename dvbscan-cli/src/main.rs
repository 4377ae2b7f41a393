//! dvbscan-cli: channel scanner over a recorded transport stream.
//!
//! The recording stands in for a tuner: every transponder tunes to it.
//! Found channels are written as JSON to stdout or to `--output`.

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::oneshot;

use dvbscan::device::FRONTEND_POLL_INTERVAL;
use dvbscan::{run_scan, DvbConfig, DvbDevice, DvbScan, ScanOutcome};
use dvbscan_protocol::{parse_scan_file, ChannelCandidate, DeviceState, Transponder};

mod logging;
mod replay;

use replay::ReplayBackend;

/// dvbscan-cli - DVB channel scanner replaying a recorded transport stream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorded transport stream to replay
    #[arg(short, long)]
    input: PathBuf,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Transponder line, e.g. "T 474000000 8MHz 2/3 NONE QAM16 8k 1/4 NONE"
    #[arg(short, long)]
    transponder: Vec<String>,

    /// Initial tuning file with one transponder per line
    #[arg(long)]
    scan_file: Option<PathBuf>,

    /// Scan only the first transponder without reading the NIT
    #[arg(long)]
    live: bool,

    /// Write the channel list here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scan source name stored with each channel
    #[arg(long)]
    source: Option<String>,

    /// Write every received packet to this file
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    logging: LoggingSection,
    #[serde(flatten)]
    dvb: DvbConfig,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

/// Channel list written at the end of a scan.
#[derive(Debug, Serialize)]
struct ScanReport<'a> {
    source: &'a str,
    cancelled: bool,
    transponders: Vec<String>,
    channels: &'a [ChannelCandidate],
}

fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Transponders from the command line followed by those of the scan file.
fn collect_transponders(
    lines: &[String],
    scan_file: Option<&Path>,
) -> Result<Vec<Transponder>, Box<dyn std::error::Error>> {
    let mut transponders = Vec::new();
    for line in lines {
        let transponder: Transponder = line
            .parse()
            .map_err(|e| format!("Invalid transponder {:?}: {}", line, e))?;
        transponders.push(transponder);
    }

    if let Some(path) = scan_file {
        let contents = std::fs::read_to_string(path)?;
        let parsed = parse_scan_file(&contents)
            .map_err(|(line, e)| format!("{}:{}: {}", path.display(), line, e))?;
        transponders.extend(parsed);
    }

    Ok(transponders)
}

/// Source name: command line, then config file, then the recording's name.
fn scan_source(arg: Option<&str>, config: &DvbConfig, input: &Path) -> String {
    if let Some(source) = arg {
        return source.to_string();
    }
    if !config.device.source.is_empty() {
        return config.device.source.clone();
    }
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replay".to_string())
}

/// Device settings with the resolved source name, which USALS positioning
/// reads the orbital position from.
fn device_config(config: &DvbConfig, source: &str) -> DvbConfig {
    let mut config = config.clone();
    config.device.source = source.to_string();
    config
}

/// Tune the first transponder and wait for the device to settle.
async fn tune_live(
    device: &mut DvbDevice<ReplayBackend>,
    transponder: &Transponder,
) -> Result<Transponder, Box<dyn std::error::Error>> {
    device.tune_device(transponder)?;

    let mut interval = tokio::time::interval(FRONTEND_POLL_INTERVAL);
    loop {
        interval.tick().await;
        device.poll_frontend();
        // Nothing listens yet
        device.process_pending();

        match device.state() {
            DeviceState::Tuned => break,
            DeviceState::Tuning | DeviceState::RotorMoving => continue,
            state => return Err(format!("Tuning {} failed ({})", transponder, state.name()).into()),
        }
    }

    Ok(device.auto_transponder().unwrap_or(*transponder))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("dvbscan.toml");
        default_path.exists().then_some(default_path)
    });
    let file_config = if let Some(config_path) = &config_path {
        match load_config(config_path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", config_path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::default()
    };

    // Command line takes precedence over the config file
    let log_dir = if args.log_dir.to_string_lossy() != "logs" {
        args.log_dir.clone()
    } else {
        PathBuf::from(file_config.logging.log_dir.as_deref().unwrap_or("logs"))
    };
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };
    logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )?;

    info!("Starting dvbscan-cli v{}", env!("CARGO_PKG_VERSION"));

    let transponders = collect_transponders(&args.transponder, args.scan_file.as_deref())?;
    if transponders.is_empty() {
        error!("No transponders given; use --transponder or --scan-file");
        return Err("no transponders to scan".into());
    }
    let source = scan_source(args.source.as_deref(), &file_config.dvb, &args.input);
    info!("Scanning {} transponder(s) for source {}", transponders.len(), source);

    let mut device = DvbDevice::new(ReplayBackend::new(&args.input));
    device.acquire(device_config(&file_config.dvb, &source))?;
    info!("Using {} ({})", device.frontend_name(), device.device_id());

    if let Some(dump) = &args.dump {
        device.enable_dump(dump)?;
        info!("Dumping packets to {}", dump.display());
    }

    let (scan, notices) = if args.live {
        if transponders.len() > 1 {
            warn!("Live scan uses only the first transponder");
        }
        let transponder = tune_live(&mut device, &transponders[0]).await?;
        DvbScan::live(&source, transponder)
    } else {
        DvbScan::offline(&source, transponders)
    };

    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping scan...");
            let _ = cancel_tx.send(());
        }
    });

    let outcome: ScanOutcome = run_scan(&mut device, scan, notices, cancel_rx).await;
    device.release();

    let report = ScanReport {
        source: &source,
        cancelled: outcome.cancelled,
        transponders: outcome.transponders.iter().map(|t| t.to_string()).collect(),
        channels: &outcome.channels,
    };
    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            info!("Wrote {} channel(s) to {}", outcome.channels.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
