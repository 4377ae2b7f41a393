//! SI table builders and a looping packet source for scan tests.

use std::collections::HashMap;

use crate::demux::section::packetize;
use crate::demux::{DataChannel, PACKETS_PER_BUFFER};
use crate::ts_analyzer::{build_section, table_id, TS_PACKET_SIZE};

pub fn pat(transport_stream_id: u16, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    for &(program, pid) in programs {
        body.extend_from_slice(&program.to_be_bytes());
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
    }
    build_section(table_id::PAT, transport_stream_id, 0, 0, &body)
}

/// PMT with `(stream_type, pid)` entries; the PCR is on the first stream.
pub fn pmt(program: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    let pcr = streams.first().map_or(0x1FFF, |&(_, pid)| pid);
    let mut body = Vec::new();
    body.extend_from_slice(&(0xE000 | pcr).to_be_bytes());
    body.extend_from_slice(&[0xF0, 0x00]);
    for &(stream_type, pid) in streams {
        body.push(stream_type);
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        body.extend_from_slice(&[0xF0, 0x00]);
    }
    build_section(table_id::PMT, program, 0, 0, &body)
}

pub struct Service<'a> {
    pub service_id: u16,
    pub scrambled: bool,
    pub provider: &'a str,
    pub name: &'a str,
}

pub fn sdt(transport_stream_id: u16, network_id: u16, services: &[Service]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&network_id.to_be_bytes());
    body.push(0xFF);
    for service in services {
        let mut descriptor = vec![0x48, 0, 0x01];
        descriptor.push(service.provider.len() as u8);
        descriptor.extend_from_slice(service.provider.as_bytes());
        descriptor.push(service.name.len() as u8);
        descriptor.extend_from_slice(service.name.as_bytes());
        descriptor[1] = (descriptor.len() - 2) as u8;

        body.extend_from_slice(&service.service_id.to_be_bytes());
        body.push(0xFC);
        let status = 0x8000 | if service.scrambled { 0x1000 } else { 0 };
        body.extend_from_slice(&(status | descriptor.len() as u16).to_be_bytes());
        body.extend_from_slice(&descriptor);
    }
    build_section(table_id::SDT_ACTUAL, transport_stream_id, 0, 0, &body)
}

/// NIT with one `(transport_stream_id, descriptors)` entry per stream.
pub fn nit(network_id: u16, streams: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut entries = Vec::new();
    for (transport_stream_id, descriptors) in streams {
        entries.extend_from_slice(&transport_stream_id.to_be_bytes());
        entries.extend_from_slice(&network_id.to_be_bytes());
        entries.extend_from_slice(&(0xF000 | descriptors.len() as u16).to_be_bytes());
        entries.extend_from_slice(descriptors);
    }

    let mut body = vec![0xF0, 0x00];
    body.extend_from_slice(&(0xF000 | entries.len() as u16).to_be_bytes());
    body.extend_from_slice(&entries);
    build_section(table_id::NIT_ACTUAL, network_id, 0, 0, &body)
}

fn bcd(value: u32, digits: usize) -> Vec<u8> {
    let text = format!("{:0width$}", value, width = digits);
    let nibbles: Vec<u8> = text.bytes().map(|b| b - b'0').collect();
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Satellite delivery descriptor with FEC 3/4; `frequency` in kHz,
/// polarization 0-3.
pub fn satellite_delivery(frequency: u32, polarization: u8, symbol_rate: u32, s2: bool) -> Vec<u8> {
    let mut descriptor = vec![0x43, 11];
    descriptor.extend(bcd(frequency / 10, 8));
    descriptor.extend(bcd(192, 4));
    let system = if s2 { 0x04 } else { 0x00 };
    descriptor.push((polarization << 5) | system | 0x01);
    // 7 digits, then the FEC nibble
    descriptor.extend(bcd(symbol_rate / 100 * 10 + 3, 8));
    descriptor
}

/// Terrestrial delivery descriptor; `frequency` in Hz.
pub fn terrestrial_delivery(frequency: u32) -> Vec<u8> {
    let mut descriptor = vec![0x5A, 11];
    descriptor.extend_from_slice(&(frequency / 10).to_be_bytes());
    descriptor.extend_from_slice(&[0x1F, 0x82, 0x10, 0xFF, 0xFF, 0xFF, 0xFF]);
    descriptor
}

/// Tables repeated on their pids, with continuity carried across cycles.
#[derive(Default)]
pub struct Carousel {
    tables: Vec<(u16, Vec<Vec<u8>>)>,
    continuity: HashMap<u16, u8>,
}

impl Carousel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pid: u16, section: Vec<u8>) -> &mut Self {
        match self.tables.iter_mut().find(|(p, _)| *p == pid) {
            Some((_, sections)) => sections.push(section),
            None => self.tables.push((pid, vec![section])),
        }
        self
    }

    /// Packets of one repetition of every table.
    pub fn cycle(&mut self) -> Vec<[u8; TS_PACKET_SIZE]> {
        let mut packets = Vec::new();
        for (pid, sections) in &self.tables {
            let cc = self.continuity.entry(*pid).or_default();
            let cycle = packetize(*pid, *cc, sections, 184);
            *cc = (*cc).wrapping_add(cycle.len() as u8) & 0x0F;
            packets.extend(cycle);
        }
        packets
    }

    /// Queue one repetition on `channel`.
    pub fn feed(&mut self, channel: &DataChannel) {
        for chunk in self.cycle().chunks(PACKETS_PER_BUFFER) {
            let mut buffer = channel.get_buffer();
            let data = buffer.data_mut();
            for (index, packet) in chunk.iter().enumerate() {
                data[index * TS_PACKET_SIZE..(index + 1) * TS_PACKET_SIZE].copy_from_slice(packet);
            }
            buffer.set_size(chunk.len() * TS_PACKET_SIZE);
            channel.write_buffer(buffer);
        }
    }
}

/// Multiplex with one service, "Channel One" (program 100, PMT pid 0x200,
/// video 0x100, audio 0x101), on transport stream 1 of network 0x2114.
pub fn channel_one() -> Carousel {
    let mut carousel = Carousel::new();
    carousel
        .add(0x0000, pat(1, &[(0, 0x10), (100, 0x200)]))
        .add(0x0200, pmt(100, &[(0x1B, 0x100), (0x04, 0x101)]))
        .add(
            0x0011,
            sdt(
                1,
                0x2114,
                &[Service {
                    service_id: 100,
                    scrambled: false,
                    provider: "ACME",
                    name: "Channel One",
                }],
            ),
        );
    carousel
}
