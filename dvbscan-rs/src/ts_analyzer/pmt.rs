//! Program map table: the elementary streams of one service.

use dvbscan_protocol::PsiError;

use super::psi::{length12, pid13, EntryLoop, PsiSection};
use super::table_id;

/// Stream types a channel scan recognises as media.
pub mod stream_type {
    pub const MPEG1_VIDEO: u8 = 0x01;
    pub const MPEG2_VIDEO: u8 = 0x02;
    pub const MPEG1_AUDIO: u8 = 0x03;
    pub const MPEG2_AUDIO: u8 = 0x04;
    /// ADTS
    pub const AAC_AUDIO: u8 = 0x0F;
    pub const MPEG4_VIDEO: u8 = 0x10;
    pub const AAC_LATM_AUDIO: u8 = 0x11;
    pub const H264_VIDEO: u8 = 0x1B;
    pub const AC3_AUDIO: u8 = 0x81;
    pub const EAC3_AUDIO: u8 = 0x87;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

impl StreamKind {
    pub fn of(stream_type: u8) -> Self {
        use self::stream_type::*;
        match stream_type {
            MPEG1_VIDEO | MPEG2_VIDEO | MPEG4_VIDEO | H264_VIDEO => StreamKind::Video,
            MPEG1_AUDIO | MPEG2_AUDIO | AAC_AUDIO | AAC_LATM_AUDIO | AC3_AUDIO | EAC3_AUDIO => {
                StreamKind::Audio
            }
            _ => StreamKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
    /// Raw ES info descriptor loop.
    pub descriptors: Vec<u8>,
}

impl PmtStream {
    pub fn kind(&self) -> StreamKind {
        StreamKind::of(self.stream_type)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PmtTable {
    pub program_number: u16,
    pub version_number: u8,
    pub pcr_pid: u16,
    /// Raw program info descriptor loop.
    pub program_info: Vec<u8>,
    pub streams: Vec<PmtStream>,
}

impl PmtTable {
    pub fn parse(section: &PsiSection) -> Result<Self, PsiError> {
        section.expect_table(table_id::PMT)?;

        let data = section.data;
        if data.len() < 4 {
            return Err(PsiError::Malformed("PMT data too short"));
        }

        let info_end = 4 + length12(data[2], data[3]);
        let Some(program_info) = data.get(4..info_end) else {
            return Err(PsiError::Malformed("invalid program info length"));
        };

        let streams = EntryLoop::new(&data[info_end..], 5, "PMT")
            .map(|(header, descriptors)| PmtStream {
                stream_type: header[0],
                pid: pid13(header[1], header[2]),
                descriptors: descriptors.to_vec(),
            })
            .collect();

        Ok(PmtTable {
            program_number: section.header.table_id_extension,
            version_number: section.header.version_number,
            pcr_pid: pid13(data[0], data[1]),
            program_info: program_info.to_vec(),
            streams,
        })
    }

    /// The last video stream of the program.
    pub fn video_pid(&self) -> Option<u16> {
        self.streams
            .iter()
            .rev()
            .find(|stream| stream.kind() == StreamKind::Video)
            .map(|stream| stream.pid)
    }

    /// Audio streams in PMT order.
    pub fn audio_pids(&self) -> Vec<u16> {
        self.streams
            .iter()
            .filter(|stream| stream.kind() == StreamKind::Audio)
            .map(|stream| stream.pid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::build_section;

    fn parse(body: &[u8]) -> Result<PmtTable, PsiError> {
        let raw = build_section(table_id::PMT, 0x0064, 0, 0, body);
        PmtTable::parse(&PsiSection::parse(&raw)?)
    }

    #[test]
    fn test_streams() {
        let pmt = parse(&[
            0xE1, 0x00, 0xF0, 0x03, 0x09, 0x01, 0xFF,
            0x1B, 0xE1, 0x00, 0xF0, 0x00,
            0x04, 0xE1, 0x10, 0xF0, 0x02, 0x0A, 0x00,
            0x06, 0xE1, 0x20, 0xF0, 0x00,
            0x0F, 0xE1, 0x11, 0xF0, 0x00,
        ])
        .unwrap();

        assert_eq!(pmt.program_number, 100);
        assert_eq!(pmt.pcr_pid, 0x100);
        assert_eq!(pmt.program_info, vec![0x09, 0x01, 0xFF]);
        assert_eq!(pmt.streams.len(), 4);
        assert_eq!(pmt.streams[1].descriptors, vec![0x0A, 0x00]);
        assert_eq!(pmt.streams[2].kind(), StreamKind::Other);
        assert_eq!(pmt.video_pid(), Some(0x100));
        assert_eq!(pmt.audio_pids(), vec![0x110, 0x111]);
    }

    #[test]
    fn test_stream_kinds() {
        for stream_type in [0x01, 0x02, 0x10, 0x1B] {
            assert_eq!(StreamKind::of(stream_type), StreamKind::Video);
        }
        for stream_type in [0x03, 0x04, 0x0F, 0x11, 0x81, 0x87] {
            assert_eq!(StreamKind::of(stream_type), StreamKind::Audio);
        }
        for stream_type in [0x05, 0x06, 0x24, 0x86] {
            assert_eq!(StreamKind::of(stream_type), StreamKind::Other);
        }
    }

    #[test]
    fn test_truncated_stream_loop() {
        let pmt = parse(&[
            0xE1, 0x00, 0xF0, 0x00,
            0x02, 0xE1, 0x00, 0xF0, 0x00,
            0x1B, 0xE1, 0x01, 0xF0, 0x00,
            0x03, 0xE1, 0x02, 0xF0, 0x08, 0x00,
        ])
        .unwrap();

        assert_eq!(pmt.streams.len(), 2);
        assert_eq!(pmt.video_pid(), Some(0x101));
        assert!(pmt.audio_pids().is_empty());
    }

    #[test]
    fn test_bad_program_info_length() {
        assert_eq!(
            parse(&[0xE1, 0x00, 0xF0, 0x10, 0x00]).unwrap_err(),
            PsiError::Malformed("invalid program info length")
        );
        assert!(parse(&[0xE1, 0x00]).is_err());
    }
}
