//! Section filter collecting every section of one SI table.

use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;

use crate::demux::{FilterControl, SectionFilter};
use crate::ts_analyzer::{table_id, NitTable, PatTable, PmtTable, PsiSection, SdtTable};

/// Table a scan filter waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Pat,
    Pmt,
    Sdt,
    Nit,
}

impl FilterType {
    pub fn table_id(self) -> u8 {
        match self {
            FilterType::Pat => table_id::PAT,
            FilterType::Pmt => table_id::PMT,
            FilterType::Sdt => table_id::SDT_ACTUAL,
            FilterType::Nit => table_id::NIT_ACTUAL,
        }
    }

    /// Time allowed to collect the whole table.
    pub fn timeout(self) -> Duration {
        match self {
            // NIT repetition rates are as low as one per 10 s
            FilterType::Nit => Duration::from_secs(20),
            _ => Duration::from_secs(5),
        }
    }
}

/// Decoded section delivered to the scan engine.
#[derive(Debug, Clone)]
pub enum Table {
    Pat(PatTable),
    Pmt { pid: u16, table: PmtTable },
    Sdt(SdtTable),
    Nit(NitTable),
}

#[derive(Debug, Clone)]
pub enum ScanEventKind {
    Table(Table),
    /// Every section of the table was seen; the filter has unregistered
    /// itself.
    Finished,
}

/// Message from a [`ScanFilter`], tagged with the pool slot and the
/// generation the filter was started with.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub slot: usize,
    pub generation: u64,
    pub kind: ScanEventKind,
}

/// Collects sections `0..=last_section_number` of one table, each once.
pub struct ScanFilter {
    slot: usize,
    generation: u64,
    filter_type: FilterType,
    pid: u16,
    /// Table id extension the sections must carry, if any.
    table_id_extension: Option<u16>,
    /// One flag per section; sized by the first section seen.
    seen: Vec<bool>,
    finished: bool,
    events: UnboundedSender<ScanEvent>,
}

impl ScanFilter {
    pub fn new(
        slot: usize,
        generation: u64,
        filter_type: FilterType,
        pid: u16,
        events: UnboundedSender<ScanEvent>,
    ) -> Self {
        Self {
            slot,
            generation,
            filter_type,
            pid,
            table_id_extension: None,
            seen: Vec::new(),
            finished: false,
            events,
        }
    }

    /// Accept only the PMT of `program_number`; programs may share a PMT pid.
    pub fn for_program(mut self, program_number: u16) -> Self {
        self.table_id_extension = Some(program_number);
        self
    }

    fn send(&self, kind: ScanEventKind) {
        // The engine may have dropped its receiver after finishing
        let _ = self.events.send(ScanEvent {
            slot: self.slot,
            generation: self.generation,
            kind,
        });
    }

    fn decode(&self, section: &PsiSection) -> Option<Table> {
        let result = match self.filter_type {
            FilterType::Pat => PatTable::parse(section).map(Table::Pat),
            FilterType::Pmt => PmtTable::parse(section).map(|table| Table::Pmt {
                pid: self.pid,
                table,
            }),
            FilterType::Sdt => SdtTable::parse(section).map(Table::Sdt),
            FilterType::Nit => NitTable::parse(section).map(Table::Nit),
        };

        match result {
            Ok(table) => Some(table),
            Err(e) => {
                debug!("invalid {:?} section on pid {}: {}", self.filter_type, self.pid, e);
                None
            }
        }
    }

    /// Record `section_number`; false for duplicates and numbers outside
    /// the announced range.
    fn mark_seen(&mut self, section_number: u8, last_section_number: u8) -> bool {
        let count = usize::from(last_section_number) + 1;
        if self.seen.is_empty() {
            self.seen = vec![false; count];
        } else if self.seen.len() != count {
            debug!(
                "inconsistent number of sections on pid {}: {} instead of {}",
                self.pid,
                count,
                self.seen.len()
            );
        }

        match self.seen.get_mut(usize::from(section_number)) {
            Some(seen) if !*seen => {
                *seen = true;
                true
            }
            _ => false,
        }
    }
}

impl SectionFilter for ScanFilter {
    fn process_section(&mut self, data: &[u8], crc_ok: bool, control: &mut FilterControl) {
        if self.finished {
            return;
        }

        if !crc_ok {
            debug!("CRC error in {:?} section on pid {}", self.filter_type, self.pid);
            return;
        }

        let Ok(section) = PsiSection::parse(data) else {
            return;
        };

        let header = section.header;
        if header.table_id != self.filter_type.table_id() || !header.section_syntax_indicator {
            // Other and stuffing tables share the SDT and NIT pids
            if !matches!(self.filter_type, FilterType::Sdt | FilterType::Nit) {
                debug!(
                    "unexpected table id 0x{:02X} on pid {}",
                    header.table_id, self.pid
                );
            }
            return;
        }

        if self
            .table_id_extension
            .is_some_and(|extension| extension != header.table_id_extension)
        {
            return;
        }

        if self.seen.get(usize::from(header.section_number)) == Some(&true) {
            return;
        }

        let Some(table) = self.decode(&section) else {
            return;
        };

        if !self.mark_seen(header.section_number, header.last_section_number) {
            return;
        }

        self.send(ScanEventKind::Table(table));

        if self.seen.iter().all(|&seen| seen) {
            self.finished = true;
            self.send(ScanEventKind::Finished);
            control.remove_self();
        }
    }
}
