//! Transport session abstraction.
//!
//! The device library behind a session owns the wire protocol and its own
//! reader threads. The bridge sees a uniform surface across serial, TCP and
//! BLE:
//! - a [`Connector`] opens sessions and runs BLE discovery;
//! - a [`Session`] sends packets and exposes the device's peer table;
//! - a [`Listener`] receives the session's callbacks, on the session's threads.

pub mod ble;
#[cfg(test)]
pub(crate) mod mock;
pub mod serial;
pub mod tcp;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::PortType;
use crate::types::ChannelInfo;

pub use ble::{BleDevice, BleScanResult, BleTarget, DiscoveryCache};
pub use serial::{SerialPortEntry, list_ports};
pub use tcp::{DEFAULT_TCP_PORT, TcpAddress};

/// Callbacks a session invokes as device events arrive.
///
/// Called on transport-owned threads, one event at a time per session.
/// Implementations must return promptly and must not panic.
pub trait Listener: Send + Sync {
    /// A decoded packet arrived.
    fn on_receive(&self, packet: Value);

    /// The device finished its handshake.
    fn on_connection_established(&self);

    /// The link dropped.
    fn on_connection_lost(&self);

    /// A peer table entry changed.
    fn on_node_updated(&self, node: Value);
}

/// An outbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub text: String,
    /// Node id or the broadcast address.
    pub destination: String,
    pub want_ack: bool,
    pub channel: u32,
    pub reply_id: Option<u32>,
}

/// An outbound raw data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    /// Encoded application payload.
    pub payload: Bytes,
    pub destination: String,
    pub port: PortType,
    pub channel: u32,
    pub hop_limit: u32,
    pub want_response: bool,
}

/// An open channel to the device.
pub trait Session: Send + Sync {
    /// Closes the session. May fire `on_connection_lost` on the listener.
    fn close(&self) -> Result<()>;

    /// Submits a text message and returns the device-assigned packet id.
    fn send_text(&self, request: &TextRequest) -> Result<u32>;

    /// Submits a raw packet without waiting for any response.
    fn send_data(&self, request: &DataRequest) -> Result<()>;

    /// Blocks until the link reports connected.
    fn wait_for_connected(&self, timeout: Duration) -> Result<()>;

    /// Blocks until the device configuration has been downloaded.
    fn wait_for_config(&self, timeout: Duration) -> Result<()>;

    /// Snapshot of the peer table, one entry per known node.
    fn nodes(&self) -> Vec<Value>;

    /// Number of the node this session is attached to.
    fn my_node_num(&self) -> Option<u32>;

    /// Channels configured on the local node.
    fn channels(&self) -> Vec<ChannelInfo> {
        Vec::new()
    }

    /// The local node's configuration: `localConfig` and `moduleConfig`
    /// blocks as decoded by the device library.
    fn device_config(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    /// Sets or clears the favorite flag of a node via the local admin channel.
    fn set_favorite(&self, node_id: &str, favorite: bool) -> Result<()>;
}

/// Opens sessions over each transport kind.
///
/// Opening blocks until the transport handshake completes or fails. The
/// listener must already be live when `open_*` is called since the device
/// may deliver queued events before the call returns.
pub trait Connector: Send + Sync {
    /// Opens a serial session on a device path.
    fn open_serial(&self, path: &str, listener: Arc<dyn Listener>) -> Result<Box<dyn Session>>;

    /// Opens a TCP session.
    fn open_tcp(
        &self,
        address: &TcpAddress,
        listener: Arc<dyn Listener>,
    ) -> Result<Box<dyn Session>>;

    /// Opens a BLE session, skipping discovery when the target carries a
    /// cached discovery result.
    fn open_ble(&self, target: &BleTarget, listener: Arc<dyn Listener>)
    -> Result<Box<dyn Session>>;

    /// Runs BLE discovery for `duration`.
    fn scan_ble(&self, duration: Duration) -> Result<Vec<BleDevice>>;
}
