//! Network information table of the actual network (PID 0x0010).
//!
//! Only the parts a scan needs are decoded: the network name and, per
//! transport stream, the raw descriptor loop holding the delivery
//! system descriptor.

use dvbscan_protocol::PsiError;

use super::descriptors::{find_descriptor, parse_descriptor_loop, NetworkNameDescriptor};
use super::psi::{length12, EntryLoop, PsiSection};
use super::{descriptor_tag, table_id};

#[derive(Debug, Clone, Default)]
pub struct NitTransportStream {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub descriptors: Vec<u8>,
}

impl NitTransportStream {
    /// `(tag, payload)` of each descriptor.
    pub fn descriptors(&self) -> Vec<(u8, &[u8])> {
        parse_descriptor_loop(&self.descriptors)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NitTable {
    pub network_id: u16,
    pub version_number: u8,
    pub network_name: Option<String>,
    pub transport_streams: Vec<NitTransportStream>,
}

impl NitTable {
    pub fn parse(section: &PsiSection) -> Result<Self, PsiError> {
        section.expect_table(table_id::NIT_ACTUAL)?;

        let data = section.data;
        if data.len() < 2 {
            return Err(PsiError::Malformed("NIT data too short"));
        }

        let loop_offset = 2 + length12(data[0], data[1]);
        if data.len() < loop_offset + 2 {
            return Err(PsiError::Malformed("invalid network descriptors length"));
        }

        let network_name = find_descriptor(&data[2..loop_offset], descriptor_tag::NETWORK_NAME)
            .and_then(|d| NetworkNameDescriptor::parse(d).ok())
            .map(|d| d.network_name);

        // A loop length running past the section is cut at its end
        let loop_start = loop_offset + 2;
        let loop_length = length12(data[loop_offset], data[loop_offset + 1]);
        let loop_end = (loop_start + loop_length).min(data.len());

        let transport_streams = EntryLoop::new(&data[loop_start..loop_end], 6, "NIT")
            .map(|(header, descriptors)| NitTransportStream {
                transport_stream_id: u16::from_be_bytes([header[0], header[1]]),
                original_network_id: u16::from_be_bytes([header[2], header[3]]),
                descriptors: descriptors.to_vec(),
            })
            .collect();

        Ok(NitTable {
            network_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            network_name,
            transport_streams,
        })
    }

    pub fn transport_stream(&self, transport_stream_id: u16) -> Option<&NitTransportStream> {
        self.transport_streams
            .iter()
            .find(|ts| ts.transport_stream_id == transport_stream_id)
    }
}
