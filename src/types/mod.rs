//! Data types shared across the bridge.
//!
//! - Connection state and status notifications
//! - Stored messages and ack notices
//! - Node identities and directory records
//! - Traceroute, position and telemetry reports

pub mod connection;
pub mod message;
pub mod node;
pub mod telemetry;
pub mod traceroute;

pub use connection::{ConnectionState, ConnectionStatus, Phase, TransportKind};
pub use message::{AckNotice, AckStatus, Message, NewMessage, TextMessage};
pub use node::{BROADCAST_ID, ChannelInfo, ChannelRole, NodeId, NodeRecord, canonical_node_id};
pub use telemetry::{PositionReport, TelemetryReport};
pub use traceroute::{TracerouteExchange, UNKNOWN_NODE, filter_hops};
