//! Program association table (PID 0x0000).

use dvbscan_protocol::PsiError;
use log::debug;

use super::psi::{pid13, PsiSection};
use super::table_id;

/// A program and the PID carrying its PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pid: u16,
}

#[derive(Debug, Clone, Default)]
pub struct PatTable {
    pub transport_stream_id: u16,
    pub version_number: u8,
    /// Services in section order; program 0 is not listed here.
    pub programs: Vec<PatEntry>,
    /// PID announced by program 0.
    pub network_pid: Option<u16>,
}

impl PatTable {
    pub fn parse(section: &PsiSection) -> Result<Self, PsiError> {
        section.expect_table(table_id::PAT)?;

        let entries = section.data.chunks_exact(4);
        if !entries.remainder().is_empty() {
            debug!("invalid PAT entry");
        }

        let mut network_pid = None;
        let mut programs = Vec::new();
        for entry in entries {
            let program_number = u16::from_be_bytes([entry[0], entry[1]]);
            let pid = pid13(entry[2], entry[3]);
            match program_number {
                0 => network_pid = Some(pid),
                _ => programs.push(PatEntry {
                    program_number,
                    pid,
                }),
            }
        }

        Ok(PatTable {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            programs,
            network_pid,
        })
    }

    pub fn pmt_pid(&self, program_number: u16) -> Option<u16> {
        self.programs
            .iter()
            .find(|entry| entry.program_number == program_number)
            .map(|entry| entry.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts_analyzer::build_section;

    fn parse(raw: &[u8]) -> Result<PatTable, PsiError> {
        PatTable::parse(&PsiSection::parse(raw)?)
    }

    #[test]
    fn test_programs_and_network_pid() {
        let raw = build_section(
            table_id::PAT,
            0x0401,
            0,
            0,
            &[0x00, 0x00, 0xE0, 0x10, 0x00, 0x64, 0xE2, 0x00, 0x00, 0x65, 0xE2, 0x10],
        );
        let pat = parse(&raw).unwrap();

        assert_eq!(pat.transport_stream_id, 0x0401);
        assert_eq!(pat.network_pid, Some(0x0010));
        assert_eq!(pat.programs.len(), 2);
        assert_eq!(pat.pmt_pid(100), Some(0x200));
        assert_eq!(pat.pmt_pid(101), Some(0x210));
        assert_eq!(pat.pmt_pid(0), None);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let raw = build_section(table_id::PAT, 1, 0, 0, &[0x00, 0x01, 0xE1, 0x00, 0x00, 0x02, 0xE2]);
        let pat = parse(&raw).unwrap();
        assert_eq!(
            pat.programs,
            vec![PatEntry {
                program_number: 1,
                pid: 0x100
            }]
        );
        assert_eq!(pat.network_pid, None);
    }

    #[test]
    fn test_wrong_table() {
        let raw = build_section(table_id::PMT, 1, 0, 0, &[]);
        assert_eq!(
            parse(&raw).unwrap_err(),
            PsiError::WrongTable {
                expected: table_id::PAT,
                found: table_id::PMT
            }
        );
    }
}
