//! Transport packet and PSI/SI table decoding.
//!
//! Covers what a channel scan reads: the packet header, long-form
//! sections with their CRC, the PAT, PMT, SDT (actual) and NIT (actual)
//! tables, and the descriptors naming a service or describing a
//! delivery system.

mod descriptors;
mod nit;
mod packet;
mod pat;
mod pmt;
mod psi;
mod sdt;
mod text;

pub use descriptors::{
    find_descriptor, parse_descriptor_loop, CableDeliveryDescriptor, NetworkNameDescriptor,
    SatelliteDeliveryDescriptor, ServiceDescriptor, TerrestrialDeliveryDescriptor,
};
pub use nit::{NitTable, NitTransportStream};
pub use packet::{pid_of, TsHeader, TsPacketIterator, MAX_ADAPTATION_LENGTH, SYNC_BYTE, TS_PACKET_SIZE};
pub use pat::{PatEntry, PatTable};
pub use pmt::{stream_type, PmtStream, PmtTable, StreamKind};
pub use psi::{crc32_mpeg2, PsiHeader, PsiSection};
pub use sdt::{SdtService, SdtTable};
pub use text::decode_dvb_string;

#[cfg(test)]
pub(crate) use psi::build_section;

/// PIDs with a fixed meaning.
pub mod pid {
    pub const PAT: u16 = 0x0000;
    pub const CAT: u16 = 0x0001;
    pub const NIT: u16 = 0x0010;
    /// SDT and BAT.
    pub const SDT: u16 = 0x0011;
    pub const EIT: u16 = 0x0012;
    /// Stuffing packets.
    pub const NULL: u16 = 0x1FFF;
}

pub mod table_id {
    pub const PAT: u8 = 0x00;
    pub const CAT: u8 = 0x01;
    pub const PMT: u8 = 0x02;
    pub const NIT_ACTUAL: u8 = 0x40;
    pub const NIT_OTHER: u8 = 0x41;
    pub const SDT_ACTUAL: u8 = 0x42;
    pub const SDT_OTHER: u8 = 0x46;
    /// Padding after the last section of a payload.
    pub const STUFFING: u8 = 0xFF;
}

pub mod descriptor_tag {
    pub const NETWORK_NAME: u8 = 0x40;
    pub const SERVICE_LIST: u8 = 0x41;
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    pub const CABLE_DELIVERY: u8 = 0x44;
    pub const SERVICE: u8 = 0x48;
    pub const TERRESTRIAL_DELIVERY: u8 = 0x5A;
}
