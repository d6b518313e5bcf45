//! Decoded packet handling.
//!
//! Wire decoding belongs to the device library behind the session; this
//! module starts from its decoded dictionaries:
//! - Port classification and packet field extraction
//! - Per-port parsing into typed records

pub mod packet;
pub mod parser;

pub use packet::{InboundPacket, PortType};
pub use parser::{parse_position, parse_routing, parse_telemetry, parse_text, parse_traceroute};
