//! PSI/SI section reassembly from TS packets of one PID.

use log::debug;

use crate::ts_analyzer::{crc32_mpeg2, table_id, TsHeader, TS_PACKET_SIZE};

/// Rebuilds sections that span packets or share a packet.
///
/// `buffer` only ever holds bytes not yet handed out as a section.
#[derive(Debug, Default)]
pub struct SectionReassembler {
    buffer: Vec<u8>,
    continuity_counter: u8,
    buffer_valid: bool,
}

impl SectionReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes waiting for the rest of their section.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one 188-byte packet.
    ///
    /// `on_section` receives every section completed by this packet together
    /// with the result of its CRC-32 check.
    pub fn process_packet<F>(&mut self, packet: &[u8], mut on_section: F)
    where
        F: FnMut(&[u8], bool),
    {
        let Some(header) = TsHeader::parse(packet) else {
            return;
        };

        if packet.len() < TS_PACKET_SIZE {
            debug!("short packet on pid 0x{:04X}", header.pid);
            return;
        }

        if !header.has_payload() {
            debug!("no payload");
            return;
        }

        let continuity = header.continuity_counter;

        if self.buffer_valid {
            if continuity == self.continuity_counter {
                debug!("duplicate packets");
                return;
            }

            if continuity != (self.continuity_counter + 1) & 0x0F {
                debug!("discontinuity on pid 0x{:04X}", header.pid);
                self.buffer_valid = false;
                self.buffer.clear();
            }
        }

        self.continuity_counter = continuity;

        let Some(offset) = header.payload_offset(packet) else {
            debug!("no payload or corrupt");
            return;
        };
        let mut payload = &packet[offset..TS_PACKET_SIZE];

        if header.payload_unit_start {
            let mut pointer = payload[0] as usize;

            if pointer >= payload.len() {
                debug!("invalid pointer");
                pointer = payload.len() - 1;
            }

            if self.buffer_valid {
                self.buffer.extend_from_slice(&payload[1..1 + pointer]);
                self.process_sections(true, &mut on_section);
            } else {
                // Whatever preceded the first section start is noise
                self.buffer.clear();
                self.buffer_valid = true;
            }

            payload = &payload[pointer + 1..];
        } else if !self.buffer_valid {
            return;
        }

        self.buffer.extend_from_slice(payload);
        self.process_sections(false, &mut on_section);
    }

    fn process_sections<F>(&mut self, force: bool, on_section: &mut F)
    where
        F: FnMut(&[u8], bool),
    {
        let end = self.buffer.len();
        let mut it = 0;

        while it != end {
            if self.buffer[it] == table_id::STUFFING {
                it = end;
                break;
            }

            if end - it < 3 {
                if force {
                    debug!("stray data");
                    it = end;
                }
                break;
            }

            let length =
                ((self.buffer[it + 1] as usize & 0x0F) << 8) | self.buffer[it + 2] as usize;
            let mut section_end = it + length + 3;

            if force && section_end > end {
                debug!("short section");
                section_end = end;
            }

            if section_end > end {
                break;
            }

            let section = &self.buffer[it..section_end];
            let crc_ok = crc32_mpeg2(section) == 0;
            on_section(section, crc_ok);
            it = section_end;
        }

        self.buffer.drain(..it);
    }
}

/// Split `sections` into TS packets on `pid`, starting at continuity `cc`.
///
/// At most `chunk` section bytes go into each packet; the rest of the
/// packet is adaptation field stuffing.
#[cfg(test)]
pub(crate) fn packetize(pid: u16, mut cc: u8, sections: &[Vec<u8>], chunk: usize) -> Vec<[u8; 188]> {
    let stream: Vec<u8> = sections.concat();
    let mut starts = Vec::new();
    let mut position = 0;
    for section in sections {
        starts.push(position);
        position += section.len();
    }

    let mut packets = Vec::new();
    let mut offset = 0;

    while offset < stream.len() {
        let mut take = chunk.clamp(1, 184).min(stream.len() - offset);
        let mut start_in = starts.iter().copied().find(|&s| s >= offset && s < offset + take);
        if start_in.is_some() && take == 184 {
            take = 183;
            start_in = starts.iter().copied().find(|&s| s >= offset && s < offset + take);
        }

        let mut payload = Vec::with_capacity(184);
        if let Some(start) = start_in {
            payload.push((start - offset) as u8);
        }
        payload.extend_from_slice(&stream[offset..offset + take]);

        let mut packet = [0xFFu8; 188];
        packet[0] = 0x47;
        packet[1] = ((pid >> 8) as u8 & 0x1F) | if start_in.is_some() { 0x40 } else { 0 };
        packet[2] = pid as u8;
        packet[3] = 0x10 | (cc & 0x0F);

        let pad = 184 - payload.len();
        if pad > 0 {
            packet[3] |= 0x20;
            packet[4] = (pad - 1) as u8;
            if pad > 1 {
                packet[5] = 0x00;
            }
        }
        packet[4 + pad..].copy_from_slice(&payload);

        offset += take;
        cc = (cc + 1) & 0x0F;
        packets.push(packet);
    }

    packets
}
