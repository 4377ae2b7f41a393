//! Transport stream demultiplexing: buffer exchange, PID dispatch and
//! section reassembly.

pub mod buffer;
pub mod dispatcher;
pub mod dump;
pub mod section;

pub use buffer::{DataChannel, PacketBuffer, BUFFER_SIZE, PACKETS_PER_BUFFER};
pub use dispatcher::{FilterControl, FilterId, PidDispatcher, PidFilter, SectionFilter};
pub use dump::PacketDumper;
pub use section::SectionReassembler;
