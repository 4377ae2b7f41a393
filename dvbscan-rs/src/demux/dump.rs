//! Raw packet dump of every filtered PID.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::dispatcher::{FilterControl, PidFilter};

/// Appends every packet it sees to a file.
pub struct PacketDumper {
    writer: BufWriter<File>,
    path: PathBuf,
    packets: u64,
    failed: bool,
}

impl PacketDumper {
    /// Create (or truncate) the dump file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        info!("dumping packets to {}", path.display());

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            packets: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Packets written so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl PidFilter for PacketDumper {
    fn process_packet(&mut self, packet: &[u8], _control: &mut FilterControl) {
        if self.failed {
            return;
        }

        if let Err(e) = self.writer.write_all(packet) {
            warn!("cannot write to {}: {}", self.path.display(), e);
            self.failed = true;
            return;
        }

        self.packets += 1;
    }
}

impl Drop for PacketDumper {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("cannot flush {}: {}", self.path.display(), e);
        }
    }
}
