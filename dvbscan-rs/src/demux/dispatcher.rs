//! PID based packet dispatch to raw and section filters.
//!
//! Filters are owned by the dispatcher and addressed by the [`FilterId`]
//! returned on registration. Removing a filter replaces its slot with a
//! tombstone so that slot indices stay stable while a packet is being
//! dispatched; the tombstones are compacted by [`PidDispatcher::cleanup`],
//! which the device runs before every drain of the packet queue.

use std::collections::BTreeMap;

use dvbscan_protocol::DeviceError;
use log::{debug, warn};

use super::dump::PacketDumper;
use super::section::SectionReassembler;
use crate::device::DeviceBackend;
use crate::ts_analyzer::{pid_of, TS_PACKET_SIZE};

/// Handle of a registered filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

/// Lets a filter act on its own registration while it is being invoked.
#[derive(Debug, Default)]
pub struct FilterControl {
    remove: bool,
}

impl FilterControl {
    /// Unregister the calling filter once it returns.
    ///
    /// The filter is dropped at the next cleanup and receives no further
    /// data, not even from the packet currently being dispatched.
    pub fn remove_self(&mut self) {
        self.remove = true;
    }

    pub fn is_removing(&self) -> bool {
        self.remove
    }
}

/// Consumer of every raw packet of one PID.
pub trait PidFilter: Send {
    fn process_packet(&mut self, packet: &[u8], control: &mut FilterControl);
}

/// Consumer of the reassembled sections of one PID.
pub trait SectionFilter: Send {
    /// `crc_ok` is false when the CRC-32 of `section` does not match.
    fn process_section(&mut self, section: &[u8], crc_ok: bool, control: &mut FilterControl);
}

enum PidSlot {
    Raw {
        id: FilterId,
        filter: Box<dyn PidFilter>,
    },
    /// Feeds the section group of the same PID.
    Sections,
    /// Writes the packet to the dump file.
    Dump,
    Tombstone,
}

#[derive(Default)]
struct PidEntry {
    slots: Vec<PidSlot>,
    active: usize,
}

enum SectionSlot {
    Active {
        id: FilterId,
        filter: Box<dyn SectionFilter>,
    },
    Tombstone,
}

#[derive(Default)]
struct SectionGroup {
    reassembler: SectionReassembler,
    slots: Vec<SectionSlot>,
    active: usize,
}

/// Routes packets by PID and keeps the hardware PID filters in sync.
#[derive(Default)]
pub struct PidDispatcher {
    pids: BTreeMap<u16, PidEntry>,
    sections: BTreeMap<u16, SectionGroup>,
    dumper: Option<PacketDumper>,
    next_id: u64,
    clean_up: bool,
}

impl PidDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> FilterId {
        self.next_id += 1;
        FilterId(self.next_id)
    }

    /// Number of live filters (raw filters plus the section group) on `pid`.
    pub fn active_filters(&self, pid: u16) -> usize {
        self.pids.get(&pid).map_or(0, |entry| entry.active)
    }

    /// Number of live section filters on `pid`.
    pub fn active_section_filters(&self, pid: u16) -> usize {
        self.sections.get(&pid).map_or(0, |group| group.active)
    }

    /// PIDs that currently have an entry, including ones awaiting cleanup.
    pub fn pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.pids.keys().copied()
    }

    fn add_slot<B>(&mut self, pid: u16, slot: PidSlot, backend: &mut B) -> Result<(), DeviceError>
    where
        B: DeviceBackend + ?Sized,
    {
        let dumping = self.dumper.is_some();
        let entry = self.pids.entry(pid).or_insert_with(|| {
            let mut entry = PidEntry::default();
            if dumping {
                entry.slots.push(PidSlot::Dump);
            }
            entry
        });

        if entry.active == 0 && !backend.add_pid_filter(pid) {
            warn!("cannot start pid filter 0x{:04X}", pid);
            self.clean_up = true;
            return Err(DeviceError::FilterRejected(pid));
        }

        entry.slots.push(slot);
        entry.active += 1;
        Ok(())
    }

    /// Tombstone the slot at `index` and stop the hardware filter if it was
    /// the last live one.
    fn release_slot<B>(entry: &mut PidEntry, pid: u16, index: usize, backend: &mut B)
    where
        B: DeviceBackend + ?Sized,
    {
        entry.slots[index] = PidSlot::Tombstone;
        entry.active -= 1;

        if entry.active == 0 {
            backend.remove_pid_filter(pid);
        }
    }

    /// Register a raw packet filter.
    ///
    /// The hardware is asked to deliver `pid` when this is its first live
    /// filter; a refusal leaves nothing registered.
    pub fn add_pid_filter<B>(
        &mut self,
        pid: u16,
        filter: Box<dyn PidFilter>,
        backend: &mut B,
    ) -> Result<FilterId, DeviceError>
    where
        B: DeviceBackend + ?Sized,
    {
        let id = self.allocate_id();
        self.add_slot(pid, PidSlot::Raw { id, filter }, backend)?;
        Ok(id)
    }

    /// Unregister a raw packet filter.
    pub fn remove_pid_filter<B>(
        &mut self,
        pid: u16,
        id: FilterId,
        backend: &mut B,
    ) -> Result<(), DeviceError>
    where
        B: DeviceBackend + ?Sized,
    {
        let found = self.pids.get_mut(&pid).and_then(|entry| {
            entry
                .slots
                .iter()
                .position(|slot| matches!(slot, PidSlot::Raw { id: slot_id, .. } if *slot_id == id))
                .map(|index| (entry, index))
        });

        let Some((entry, index)) = found else {
            warn!("trying to remove a nonexistent filter on pid 0x{:04X}", pid);
            return Err(DeviceError::NotRegistered(pid));
        };

        Self::release_slot(entry, pid, index, backend);
        self.clean_up = true;
        Ok(())
    }

    /// Register a section filter.
    ///
    /// All section filters of a PID share one reassembler, which occupies a
    /// single slot in the PID's raw filter list.
    pub fn add_section_filter<B>(
        &mut self,
        pid: u16,
        filter: Box<dyn SectionFilter>,
        backend: &mut B,
    ) -> Result<FilterId, DeviceError>
    where
        B: DeviceBackend + ?Sized,
    {
        let needs_slot = self.sections.get(&pid).map_or(true, |group| group.active == 0);

        if needs_slot {
            if let Err(err) = self.add_slot(pid, PidSlot::Sections, backend) {
                if self.active_section_filters(pid) == 0 {
                    self.sections.remove(&pid);
                }
                return Err(err);
            }
            // The hardware filter restarted, so partial sections are stale
            self.sections.insert(pid, SectionGroup::default());
        }

        let id = self.allocate_id();
        let group = self.sections.entry(pid).or_default();
        group.slots.push(SectionSlot::Active { id, filter });
        group.active += 1;
        Ok(id)
    }

    /// Unregister a section filter.
    pub fn remove_section_filter<B>(
        &mut self,
        pid: u16,
        id: FilterId,
        backend: &mut B,
    ) -> Result<(), DeviceError>
    where
        B: DeviceBackend + ?Sized,
    {
        let found = self.sections.get_mut(&pid).and_then(|group| {
            group
                .slots
                .iter()
                .position(
                    |slot| matches!(slot, SectionSlot::Active { id: slot_id, .. } if *slot_id == id),
                )
                .map(|index| (group, index))
        });

        let Some((group, index)) = found else {
            warn!("trying to remove a nonexistent filter on pid 0x{:04X}", pid);
            return Err(DeviceError::NotRegistered(pid));
        };

        group.slots[index] = SectionSlot::Tombstone;
        group.active -= 1;

        if group.active == 0 {
            self.release_sections_slot(pid, backend);
        }

        self.clean_up = true;
        Ok(())
    }

    fn release_sections_slot<B>(&mut self, pid: u16, backend: &mut B)
    where
        B: DeviceBackend + ?Sized,
    {
        let Some(entry) = self.pids.get_mut(&pid) else {
            return;
        };

        if let Some(index) = entry
            .slots
            .iter()
            .position(|slot| matches!(slot, PidSlot::Sections))
        {
            Self::release_slot(entry, pid, index, backend);
        }
    }

    /// Drop every filter and stop all hardware PID filters.
    ///
    /// The dump file, if any, stays open and is attached to the next PIDs.
    pub fn remove_all<B>(&mut self, backend: &mut B)
    where
        B: DeviceBackend + ?Sized,
    {
        for (pid, entry) in &self.pids {
            for slot in &entry.slots {
                if matches!(slot, PidSlot::Raw { .. }) {
                    warn!("removing pending filter on pid 0x{:04X}", pid);
                }
            }

            if entry.active > 0 {
                backend.remove_pid_filter(*pid);
            }
        }

        for (pid, group) in &self.sections {
            for slot in &group.slots {
                if matches!(slot, SectionSlot::Active { .. }) {
                    warn!("removing pending section filter on pid 0x{:04X}", pid);
                }
            }
        }

        self.pids.clear();
        self.sections.clear();
        self.clean_up = false;
    }

    /// Attach a packet dumper to every current and future PID.
    pub fn enable_dump(&mut self, dumper: PacketDumper) {
        if self.dumper.is_some() {
            debug!("packet dump already enabled");
            return;
        }

        for entry in self.pids.values_mut() {
            entry.slots.push(PidSlot::Dump);
        }

        self.dumper = Some(dumper);
    }

    pub fn dumper(&self) -> Option<&PacketDumper> {
        self.dumper.as_ref()
    }

    /// Compact tombstones and forget PIDs without live filters.
    pub fn cleanup(&mut self) {
        if !self.clean_up {
            return;
        }

        self.pids.retain(|_, entry| {
            entry.slots.retain(|slot| !matches!(slot, PidSlot::Tombstone));
            entry.active > 0
        });

        self.sections.retain(|_, group| {
            group
                .slots
                .retain(|slot| !matches!(slot, SectionSlot::Tombstone));
            group.active > 0
        });

        self.clean_up = false;
    }

    /// Hand one 188-byte packet to the filters of its PID, in registration
    /// order.
    pub fn dispatch<B>(&mut self, packet: &[u8], backend: &mut B)
    where
        B: DeviceBackend + ?Sized,
    {
        if packet.len() < TS_PACKET_SIZE {
            return;
        }

        if packet[1] & 0x80 != 0 {
            debug!("transport error");
            return;
        }

        let pid = pid_of(packet);

        let Self {
            pids,
            sections,
            dumper,
            clean_up,
            ..
        } = self;

        let Some(entry) = pids.get_mut(&pid) else {
            return;
        };

        let count = entry.slots.len();

        for index in 0..count {
            let release = match &mut entry.slots[index] {
                PidSlot::Raw { filter, .. } => {
                    let mut control = FilterControl::default();
                    filter.process_packet(packet, &mut control);
                    control.remove
                }
                PidSlot::Sections => match sections.get_mut(&pid) {
                    Some(group) => {
                        let removed = group.process_packet(packet);
                        if removed {
                            *clean_up = true;
                        }
                        removed && group.active == 0
                    }
                    None => false,
                },
                PidSlot::Dump => {
                    if let Some(dumper) = dumper.as_mut() {
                        let mut control = FilterControl::default();
                        dumper.process_packet(packet, &mut control);
                    }
                    false
                }
                PidSlot::Tombstone => false,
            };

            if release {
                Self::release_slot(entry, pid, index, backend);
                *clean_up = true;
            }
        }
    }
}

impl SectionGroup {
    /// Returns true when a filter removed itself.
    fn process_packet(&mut self, packet: &[u8]) -> bool {
        let SectionGroup {
            reassembler,
            slots,
            active,
        } = self;
        let mut removed = false;

        reassembler.process_packet(packet, |section, crc_ok| {
            for slot in slots.iter_mut() {
                let remove = match slot {
                    SectionSlot::Active { filter, .. } => {
                        let mut control = FilterControl::default();
                        filter.process_section(section, crc_ok, &mut control);
                        control.remove
                    }
                    SectionSlot::Tombstone => false,
                };

                if remove {
                    *slot = SectionSlot::Tombstone;
                    *active -= 1;
                    removed = true;
                }
            }
        });

        removed
    }
}
