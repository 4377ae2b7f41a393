//! Service description table of the actual transport stream (PID 0x0011).

use dvbscan_protocol::PsiError;
use log::debug;

use super::descriptors::{parse_descriptor_loop, ServiceDescriptor};
use super::psi::{EntryLoop, PsiSection};
use super::{descriptor_tag, table_id};

#[derive(Debug, Clone, Default)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    /// 4 is running.
    pub running_status: u8,
    /// free_CA_mode: some component is scrambled.
    pub scrambled: bool,
    /// From the first valid service descriptor.
    pub descriptor: Option<ServiceDescriptor>,
}

impl SdtService {
    pub fn name(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.service_name.as_str())
    }

    pub fn provider(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.provider_name.as_str())
    }
}

fn service_descriptor(descriptors: &[u8]) -> Option<ServiceDescriptor> {
    parse_descriptor_loop(descriptors)
        .into_iter()
        .filter(|(tag, _)| *tag == descriptor_tag::SERVICE)
        .find_map(|(_, data)| match ServiceDescriptor::parse(data) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                debug!("invalid service descriptor: {}", e);
                None
            }
        })
}

#[derive(Debug, Clone, Default)]
pub struct SdtTable {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub version_number: u8,
    pub services: Vec<SdtService>,
}

impl SdtTable {
    /// Parse an SDT section; sections describing other transport streams
    /// (0x46) are refused.
    pub fn parse(section: &PsiSection) -> Result<Self, PsiError> {
        section.expect_table(table_id::SDT_ACTUAL)?;

        let data = section.data;
        if data.len() < 3 {
            return Err(PsiError::Malformed("SDT data too short"));
        }

        let services = EntryLoop::new(&data[3..], 5, "SDT")
            .map(|(header, descriptors)| SdtService {
                service_id: u16::from_be_bytes([header[0], header[1]]),
                eit_schedule: header[2] & 0x02 != 0,
                eit_present_following: header[2] & 0x01 != 0,
                running_status: header[3] >> 5,
                scrambled: header[3] & 0x10 != 0,
                descriptor: service_descriptor(descriptors),
            })
            .collect();

        Ok(SdtTable {
            transport_stream_id: section.header.table_id_extension,
            original_network_id: u16::from_be_bytes([data[0], data[1]]),
            version_number: section.header.version_number,
            services,
        })
    }

    pub fn service(&self, service_id: u16) -> Option<&SdtService> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}
