//! # meshbridge
//!
//! Connection and event-management core that bridges a packet-radio mesh
//! device to async consumers.
//!
//! The device library behind a [`Session`] owns the wire protocol and calls
//! back on its own threads. This crate keeps a single session alive across
//! serial, TCP and BLE, turns its callbacks into typed [`Notification`]s,
//! persists text traffic to a [`MessageStore`], and keeps a normalized view
//! of the device's peer table.
//!
//! ## Features
//!
//! - One connection at a time, with a single automatic reconnect for TCP
//! - BLE connects in the background, reusing the last scan's results
//! - Broadcast notification fan-out using Tokio channels
//! - Delivery confirmation tracking for sent messages
//! - SQLite or in-memory message history
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use meshbridge::{Config, Connector, MeshBridge, SqliteStore};
//!
//! async fn run(connector: Arc<dyn Connector>) -> meshbridge::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(SqliteStore::open(config.database_path())?);
//!     let bridge = MeshBridge::new(connector, store, &config)?;
//!
//!     let mut notifications = bridge.subscribe();
//!     if bridge.connect_tcp("192.168.1.20", 4403) {
//!         let packet_id = bridge.send_message("hello mesh", None, 0, None).await?;
//!         println!("sent packet {packet_id:?}");
//!     }
//!
//!     while let Some(notification) = notifications.recv().await {
//!         println!("{}", notification.to_json()?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - The [`MeshBridge`] connection lifecycle controller
//! - [`dispatch`] - Routing of session callbacks to notifications and storage
//! - [`bridge`] - Hand-off of work from callback threads to the runtime
//! - [`nodes`] - Node directory over the device's peer table
//! - [`event`] - Notification types and fan-out
//! - [`store`] - Message persistence
//! - [`protocol`] - Decoded packet classification and parsing
//! - [`transport`] - Session abstraction and transport addressing
//! - [`types`] - Shared data types
//! - [`config`] - TOML configuration

pub mod bridge;
pub mod client;
pub mod compat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod nodes;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use bridge::Bridge;
pub use client::MeshBridge;
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use event::{
    Notification, NotificationFilter, NotificationKind, NotificationSink, Subscription,
};
pub use nodes::NodeDirectory;
pub use protocol::{InboundPacket, PortType};
pub use store::{MemoryStore, MessageFilter, MessageStore, SqliteStore};
pub use transport::{
    BleDevice, BleScanResult, BleTarget, Connector, DataRequest, Listener, Session, TcpAddress,
    TextRequest, list_ports,
};
pub use types::{
    AckNotice, AckStatus, ChannelInfo, ChannelRole, ConnectionState, ConnectionStatus, Message,
    NewMessage, NodeId, NodeRecord, Phase, PositionReport, TelemetryReport, TextMessage,
    TracerouteExchange, TransportKind,
};
