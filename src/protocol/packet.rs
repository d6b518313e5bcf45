//! Application port classification for decoded device packets.
//!
//! Each decoded packet carries a `portnum` telling which application on the
//! device produced it. Older library versions report the symbolic name, raw
//! captures report the number; both are accepted.

use serde_json::{Map, Value};

use crate::compat;
use crate::types::{BROADCAST_ID, NodeId, UNKNOWN_NODE};

/// Application ports the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    /// Plain text message.
    Text,
    /// GPS position.
    Position,
    /// Routing control (delivery confirmations).
    Routing,
    /// Device and environment metrics.
    Telemetry,
    /// Route discovery.
    Traceroute,
    /// Anything else.
    Other,
}

impl PortType {
    /// Classifies a numeric port.
    #[must_use]
    pub const fn from_number(number: u64) -> Self {
        match number {
            1 => Self::Text,
            3 => Self::Position,
            5 => Self::Routing,
            67 => Self::Telemetry,
            70 => Self::Traceroute,
            _ => Self::Other,
        }
    }

    /// Classifies a symbolic port name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "TEXT_MESSAGE_APP" => Self::Text,
            "POSITION_APP" => Self::Position,
            "ROUTING_APP" => Self::Routing,
            "TELEMETRY_APP" => Self::Telemetry,
            "TRACEROUTE_APP" => Self::Traceroute,
            _ => Self::Other,
        }
    }

    /// Classifies a `portnum` field of either shape.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(name) => Self::from_name(name),
            Value::Number(n) => n.as_u64().map_or(Self::Other, Self::from_number),
            _ => Self::Other,
        }
    }

    /// Returns the port number used when sending.
    #[must_use]
    pub const fn number(self) -> Option<u32> {
        match self {
            Self::Text => Some(1),
            Self::Position => Some(3),
            Self::Routing => Some(5),
            Self::Telemetry => Some(67),
            Self::Traceroute => Some(70),
            Self::Other => None,
        }
    }
}

/// One decoded packet, lifted out of the loosely-typed dictionary the
/// session delivers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    /// Device-assigned packet id.
    pub id: Option<u32>,
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    pub channel: u32,
    pub port: PortType,
    /// Port-specific decoded fields.
    pub decoded: Map<String, Value>,
    /// Receive time (Unix seconds).
    pub rx_time: Option<i64>,
    pub rx_snr: Option<f64>,
    pub hop_limit: Option<u32>,
    pub reply_id: Option<u32>,
}

impl InboundPacket {
    /// Reads a packet dictionary. Missing or mistyped fields become `None`
    /// or defaults; a non-object classifies as [`PortType::Other`].
    #[must_use]
    pub fn from_value(packet: &Value) -> Self {
        let empty = Map::new();
        let fields = packet.as_object().unwrap_or(&empty);
        let decoded = fields
            .get("decoded")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let port = decoded
            .get("portnum")
            .map_or(PortType::Other, PortType::from_value);

        Self {
            id: fields.get("id").and_then(compat::as_u32),
            from_id: node_ref(fields, "fromId", "from"),
            to_id: node_ref(fields, "toId", "to"),
            channel: fields.get("channel").and_then(compat::as_u32).unwrap_or(0),
            port,
            rx_time: fields.get("rxTime").and_then(compat::as_i64),
            rx_snr: fields.get("rxSnr").and_then(compat::as_f64),
            hop_limit: fields.get("hopLimit").and_then(compat::as_u32),
            reply_id: compat::reply_id(&decoded, fields),
            decoded,
        }
    }

    /// Returns a nested object of the decoded payload.
    #[must_use]
    pub fn decoded_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.decoded.get(key).and_then(Value::as_object)
    }
}

/// Prefers the textual id, falling back to formatting the raw number.
fn node_ref(fields: &Map<String, Value>, id_key: &str, num_key: &str) -> Option<String> {
    if let Some(id) = fields.get(id_key).and_then(compat::as_string) {
        return Some(id);
    }
    fields
        .get(num_key)
        .and_then(compat::as_u32)
        .map(|num| match num {
            UNKNOWN_NODE => BROADCAST_ID.to_owned(),
            num => NodeId::new(num).to_string(),
        })
}
