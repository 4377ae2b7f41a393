//! The fixed 188-byte transport packet and its 4-byte header.

pub const TS_PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

/// Largest adaptation field that still leaves room in a packet.
pub const MAX_ADAPTATION_LENGTH: usize = 182;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub transport_error: bool,
    /// A section (or PES packet) begins in this payload.
    pub payload_unit_start: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    /// Bit 1: adaptation field present, bit 0: payload present.
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Parse the 4-byte header at the start of `data`.
    ///
    /// The sync byte is not checked; packets handed over by a device are
    /// already aligned.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        Some(TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            pid: pid_of(data),
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
        })
    }

    pub fn has_adaptation_field(&self) -> bool {
        self.adaptation_field_control & 0x02 != 0
    }

    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }

    /// Offset of the payload inside `packet`.
    ///
    /// Returns `None` when the adaptation field length byte exceeds 182,
    /// in which case the packet is corrupt.
    pub fn payload_offset(&self, packet: &[u8]) -> Option<usize> {
        if !self.has_adaptation_field() {
            return Some(4);
        }

        let length = *packet.get(4)? as usize;
        if length > MAX_ADAPTATION_LENGTH {
            return None;
        }
        Some(5 + length)
    }
}

/// Extract the 13-bit PID without parsing the rest of the header.
#[inline]
pub fn pid_of(packet: &[u8]) -> u16 {
    ((packet[1] as u16 & 0x1F) << 8) | packet[2] as u16
}

/// Splits a byte stream into packets, skipping bytes until a sync byte
/// whenever alignment is lost.
pub struct TsPacketIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TsPacketIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut iter = Self { data, offset: 0 };
        iter.skip_to_sync();
        iter
    }

    /// Bytes not consumed yet (an incomplete trailing packet).
    pub fn remainder(&self) -> &'a [u8] {
        &self.data[self.offset.min(self.data.len())..]
    }

    fn skip_to_sync(&mut self) {
        while self.offset < self.data.len() && self.data[self.offset] != SYNC_BYTE {
            self.offset += 1;
        }
    }
}

impl<'a> Iterator for TsPacketIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset + TS_PACKET_SIZE <= self.data.len() {
            if self.data[self.offset] != SYNC_BYTE {
                self.offset += 1;
                self.skip_to_sync();
                continue;
            }

            let packet = &self.data[self.offset..self.offset + TS_PACKET_SIZE];
            self.offset += TS_PACKET_SIZE;
            return Some(packet);
        }
        None
    }
}
