//! Node identity and directory records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Destination id meaning "every node on the channel".
pub const BROADCAST_ID: &str = "^all";

/// A 32-bit mesh node number, shown as `!xxxxxxxx`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a node id from its number.
    #[must_use]
    pub const fn new(num: u32) -> Self {
        Self(num)
    }

    /// Returns the node number.
    #[must_use]
    pub const fn num(self) -> u32 {
        self.0
    }

    /// Parses `!12345678` or `12345678` (eight hex digits).
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not eight hex digits.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let digits = s.strip_prefix('!').unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| Error::InvalidNodeId {
            reason: format!("{s}: {e}"),
        })?;
        let bytes: [u8; 4] = bytes.try_into().map_err(|_| Error::InvalidNodeId {
            reason: format!("{s}: expected 8 hex digits"),
        })?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", hex::encode(self.0.to_be_bytes()))
    }
}

/// Canonical `!`-prefixed form of a user-supplied node id.
#[must_use]
pub fn canonical_node_id(id: &str) -> String {
    if id.starts_with('!') {
        id.to_owned()
    } else {
        format!("!{id}")
    }
}

/// Normalized view of one peer table entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// User id (`!xxxxxxxx`), absent until the node has announced itself.
    pub id: Option<String>,
    /// Raw node number.
    pub num: Option<u32>,
    /// User profile.
    pub user: Option<Value>,
    /// Last reported position.
    pub position: Option<Value>,
    /// Signal-to-noise ratio of the last packet heard.
    pub snr: Option<f64>,
    /// Unix time the node was last heard.
    pub last_heard: Option<i64>,
    /// Battery/voltage/utilization metrics.
    pub device_metrics: Option<Value>,
    /// Whether the node is marked favorite on the device.
    pub is_favorite: bool,
}

impl NodeRecord {
    /// Returns true if `id` names this node by user id or decimal number.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id) || self.num.is_some_and(|n| n.to_string() == id)
    }
}

/// Role of a configured channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelRole {
    Disabled,
    Primary,
    Secondary,
    Unknown,
}

impl ChannelRole {
    /// Maps the device's numeric role.
    #[must_use]
    pub const fn from_number(role: u32) -> Self {
        match role {
            0 => Self::Disabled,
            1 => Self::Primary,
            2 => Self::Secondary,
            _ => Self::Unknown,
        }
    }
}

/// A configured channel on the local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub index: u32,
    pub name: String,
    pub role: ChannelRole,
}
