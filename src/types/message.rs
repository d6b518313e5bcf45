//! Message records and message-related notifications.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Delivery state of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Sent, no routing confirmation yet.
    Pending,
    /// Delivered.
    Ack,
    /// Rejected or undeliverable.
    Nak,
    /// Delivery inferred from a rebroadcast.
    ImplicitAck,
    /// Gave up.
    Failed,
    /// Inbound message.
    Received,
}

impl AckStatus {
    /// Maps a routing `errorReason` to an ack status.
    #[must_use]
    pub fn from_error_reason(reason: &str) -> Self {
        if reason == "NONE" { Self::Ack } else { Self::Nak }
    }

    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ack => "ack",
            Self::Nak => "nak",
            Self::ImplicitAck => "implicit_ack",
            Self::Failed => "failed",
            Self::Received => "received",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "ack" => Some(Self::Ack),
            "nak" => Some(Self::Nak),
            "implicit_ack" => Some(Self::ImplicitAck),
            "failed" => Some(Self::Failed),
            "received" => Some(Self::Received),
            _ => None,
        }
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message about to be appended to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub packet_id: Option<u32>,
    pub sender: String,
    pub receiver: Option<String>,
    pub channel: u32,
    pub text: String,
    pub is_outgoing: bool,
    pub ack_status: AckStatus,
    pub reply_id: Option<u32>,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned, monotonic.
    pub id: i64,
    /// Device-assigned packet id. Not unique over the store's lifetime.
    pub packet_id: Option<u32>,
    pub sender: String,
    pub receiver: Option<String>,
    pub channel: u32,
    pub text: String,
    /// Unix seconds at insertion.
    pub timestamp: i64,
    pub ack_status: AckStatus,
    pub is_outgoing: bool,
    /// Packet id of the message this one replies to.
    pub reply_id: Option<u32>,
}

impl Message {
    /// Builds the stored row for a new record.
    #[must_use]
    pub fn from_new(id: i64, timestamp: i64, new: NewMessage) -> Self {
        Self {
            id,
            packet_id: new.packet_id,
            sender: new.sender,
            receiver: new.receiver,
            channel: new.channel,
            text: new.text,
            timestamp,
            ack_status: new.ack_status,
            is_outgoing: new.is_outgoing,
            reply_id: new.reply_id,
        }
    }
}

/// Payload of an `ack` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckNotice {
    pub packet_id: u32,
    pub status: AckStatus,
    /// Routing error reason, only for a nak.
    pub error: Option<String>,
}

/// Payload of a `message` notification (inbound text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub packet_id: Option<u32>,
    pub sender: String,
    /// Raw destination, `^all` for broadcasts.
    pub receiver: Option<String>,
    pub channel: u32,
    pub text: String,
    /// Device receive time (Unix seconds).
    pub timestamp: Option<i64>,
    pub snr: Option<f64>,
    pub hop_limit: Option<u32>,
    pub reply_id: Option<u32>,
}

impl TextMessage {
    /// Builds the incoming store record. Broadcasts are stored without a
    /// receiver.
    #[must_use]
    pub fn to_record(&self) -> NewMessage {
        NewMessage {
            packet_id: self.packet_id,
            sender: self.sender.clone(),
            receiver: self
                .receiver
                .clone()
                .filter(|receiver| receiver != super::node::BROADCAST_ID),
            channel: self.channel,
            text: self.text.clone(),
            is_outgoing: false,
            ack_status: AckStatus::Received,
            reply_id: self.reply_id,
        }
    }
}
