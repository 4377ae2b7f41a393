//! PSI (Program Specific Information) section parsing.
//!
//! This module handles common PSI section header parsing and CRC validation.

use crc::{Crc, CRC_32_MPEG_2};
use dvbscan_protocol::PsiError;
use log::debug;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// PSI section header (common to all PSI tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section syntax indicator.
    pub section_syntax_indicator: bool,
    /// Section length (12 bits).
    pub section_length: u16,
    /// Table ID extension (for long sections).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
}

/// A parsed PSI section.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    /// Section header.
    pub header: PsiHeader,
    /// Section data (after header, before CRC).
    pub data: &'a [u8],
    /// CRC32 value.
    pub crc32: u32,
}

impl<'a> PsiSection<'a> {
    /// Parse a PSI section from raw bytes starting at the table id.
    pub fn parse(data: &'a [u8]) -> Result<Self, PsiError> {
        if data.len() < 3 {
            return Err(PsiError::TooShort);
        }

        let table_id = data[0];
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;

        let total_length = 3 + section_length as usize;
        if data.len() < total_length {
            return Err(PsiError::BadLength {
                length: total_length,
                available: data.len(),
            });
        }

        let header = if section_syntax_indicator {
            // 5 header bytes after the length plus the CRC
            if section_length < 9 {
                return Err(PsiError::Malformed("long section shorter than its header"));
            }

            PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
                version_number: (data[5] >> 1) & 0x1F,
                current_next_indicator: data[5] & 0x01 != 0,
                section_number: data[6],
                last_section_number: data[7],
            }
        } else {
            if section_length < 4 {
                return Err(PsiError::Malformed("short section without CRC"));
            }

            PsiHeader {
                table_id,
                section_syntax_indicator,
                section_length,
                table_id_extension: 0,
                version_number: 0,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            }
        };

        let data_start = if section_syntax_indicator { 8 } else { 3 };
        let crc_offset = total_length - 4;

        let crc32 = u32::from_be_bytes([
            data[crc_offset],
            data[crc_offset + 1],
            data[crc_offset + 2],
            data[crc_offset + 3],
        ]);

        Ok(PsiSection {
            header,
            data: &data[data_start..crc_offset],
            crc32,
        })
    }

    /// Parse and check that the section carries `expected` as table id.
    pub fn parse_table(data: &'a [u8], expected: u8) -> Result<Self, PsiError> {
        let section = Self::parse(data)?;
        section.expect_table(expected)?;
        Ok(section)
    }

    pub fn expect_table(&self, expected: u8) -> Result<(), PsiError> {
        match self.header.table_id {
            found if found == expected => Ok(()),
            found => Err(PsiError::WrongTable { expected, found }),
        }
    }

    /// Verify CRC32 of the section.
    pub fn verify_crc(&self, full_data: &[u8]) -> bool {
        let total_length = self.total_length();
        if full_data.len() < total_length {
            return false;
        }

        crc32_mpeg2(&full_data[..total_length - 4]) == self.crc32
    }

    /// Get the total section length including header and CRC.
    pub fn total_length(&self) -> usize {
        3 + self.header.section_length as usize
    }
}

/// 13-bit PID from two bytes, ignoring the reserved bits.
pub(crate) fn pid13(hi: u8, lo: u8) -> u16 {
    u16::from_be_bytes([hi & 0x1F, lo])
}

/// 12-bit loop or descriptor length from two bytes.
pub(crate) fn length12(hi: u8, lo: u8) -> usize {
    usize::from(u16::from_be_bytes([hi & 0x0F, lo]))
}

/// Entries of a table loop: a fixed-size header ending in a 12-bit
/// descriptor length, then the descriptors.
///
/// A truncated entry ends the loop.
pub(crate) struct EntryLoop<'a> {
    data: &'a [u8],
    header_len: usize,
    table: &'static str,
}

impl<'a> EntryLoop<'a> {
    pub(crate) fn new(data: &'a [u8], header_len: usize, table: &'static str) -> Self {
        Self {
            data,
            header_len,
            table,
        }
    }
}

impl<'a> Iterator for EntryLoop<'a> {
    /// (header, descriptors)
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let entry = (self.data.len() >= self.header_len)
            .then(|| self.data.split_at(self.header_len))
            .and_then(|(header, rest)| {
                let length = length12(header[self.header_len - 2], header[self.header_len - 1]);
                (rest.len() >= length).then(|| (header, rest.split_at(length)))
            });

        match entry {
            Some((header, (descriptors, rest))) => {
                self.data = rest;
                Some((header, descriptors))
            }
            None => {
                debug!("invalid {} entry", self.table);
                self.data = &[];
                None
            }
        }
    }
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
///
/// Running it over a whole section including its CRC trailer yields 0 for
/// an intact section.
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    CRC.checksum(data)
}

/// Build a long-form section with a valid CRC trailer.
#[cfg(test)]
pub(crate) fn build_section(
    table_id: u8,
    table_id_extension: u16,
    section_number: u8,
    last_section_number: u8,
    body: &[u8],
) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut section = vec![
        table_id,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        section_length as u8,
        (table_id_extension >> 8) as u8,
        table_id_extension as u8,
        0xC1,
        section_number,
        last_section_number,
    ];
    section.extend_from_slice(body);
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}
