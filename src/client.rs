//! The connection lifecycle controller.
//!
//! [`MeshBridge`] owns the single device session. It opens sessions through a
//! [`Connector`], wires the session's callbacks into the [`Dispatcher`], and
//! exposes the consumer-facing operations: connect, disconnect, send, and
//! directory queries.
//!
//! Session callbacks are registered before a session is opened and
//! unregistered before it is closed, so the connection-lost event a close
//! triggers never reaches the controller. Every connect and teardown bumps a
//! generation counter; results of work started under an older generation
//! (a slow BLE attempt, a lost-link event from a replaced session) are
//! discarded.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::watch;

use crate::bridge::Bridge;
use crate::compat;
use crate::config::{Config, ConnectionConfig, MAX_HOP_LIMIT};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::event::{Notification, NotificationSink, Subscription};
use crate::nodes::NodeDirectory;
use crate::protocol::PortType;
use crate::store::{DEFAULT_QUERY_LIMIT, MessageFilter, MessageStore};
use crate::transport::{
    BleScanResult, BleTarget, Connector, DataRequest, DiscoveryCache, Listener, Session,
    TcpAddress, TextRequest,
};
use crate::types::{
    AckStatus, BROADCAST_ID, ChannelInfo, ChannelRole, ConnectionState, ConnectionStatus, Message,
    NewMessage, NodeId, NodeRecord, Phase, TransportKind, canonical_node_id,
};

/// Status message published when a BLE attempt starts.
const BLE_CONNECTING_MESSAGE: &str = "BLE connecting (scanning...)";

/// Recorded as `last_error` when a non-TCP link drops.
const CONNECTION_LOST: &str = "connection lost";

/// Blocks of the device configuration exposed to consumers.
const DEVICE_CONFIG_BLOCKS: [&str; 2] = ["localConfig", "moduleConfig"];

/// Sender recorded for outgoing messages before the local node is known.
const LOCAL_SENDER: &str = "local";

struct Link {
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
    callbacks: Option<Arc<Callbacks>>,
    generation: u64,
    ble_pending: bool,
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    store: Arc<dyn MessageStore>,
    sink: NotificationSink,
    bridge: Bridge,
    directory: Arc<NodeDirectory>,
    dispatcher: Dispatcher,
    discovery: DiscoveryCache,
    link: Mutex<Link>,
    connect_error: Mutex<Option<String>>,
    /// `None` while a BLE attempt is in flight, then its outcome.
    ble_outcome: watch::Sender<Option<bool>>,
}

impl Inner {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connect_error(&self, error: Option<String>) {
        *self
            .connect_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn publish_status(&self, status: ConnectionStatus) {
        self.sink.publish(Notification::ConnectionStatus(status));
    }
}

/// Controller for one mesh device connection.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct MeshBridge {
    inner: Arc<Inner>,
}

impl MeshBridge {
    /// Creates a controller scheduling store writes on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] when called outside a Tokio runtime.
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<dyn MessageStore>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self::with_bridge(connector, store, config, Bridge::current()?))
    }

    /// Creates a controller scheduling store writes through `bridge`.
    #[must_use]
    pub fn with_bridge(
        connector: Arc<dyn Connector>,
        store: Arc<dyn MessageStore>,
        config: &Config,
        bridge: Bridge,
    ) -> Self {
        let sink = NotificationSink::new(config.notifications.capacity);
        let directory = Arc::new(NodeDirectory::new());
        let dispatcher = Dispatcher::new(
            sink.clone(),
            Arc::clone(&store),
            bridge.clone(),
            Arc::clone(&directory),
        );
        let (ble_outcome, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                config: config.connection.clone(),
                connector,
                store,
                sink,
                bridge,
                directory,
                dispatcher,
                discovery: DiscoveryCache::new(),
                link: Mutex::new(Link {
                    state: ConnectionState::disconnected(),
                    session: None,
                    callbacks: None,
                    generation: 0,
                    ble_pending: false,
                }),
                connect_error: Mutex::new(None),
                ble_outcome,
            }),
        }
    }

    // ==================== Connection lifecycle ====================

    /// Connects over a serial line, replacing any current session.
    ///
    /// Blocks until the session is open. Returns false on failure; the error
    /// is kept in [`status`](Self::status).
    pub fn connect_serial(&self, path: &str) -> bool {
        self.connect_with(TransportKind::Serial, path, |connector, listener| {
            connector.open_serial(path, listener)
        })
    }

    /// Connects over TCP, replacing any current session.
    pub fn connect_tcp(&self, host: &str, port: u16) -> bool {
        self.connect_tcp_address(&TcpAddress::new(host, port))
    }

    fn connect_tcp_address(&self, target: &TcpAddress) -> bool {
        self.connect_with(
            TransportKind::Tcp,
            &target.to_string(),
            |connector, listener| connector.open_tcp(target, listener),
        )
    }

    /// Starts a BLE connection in the background, replacing any current
    /// session.
    ///
    /// Returns true once the attempt is launched; use
    /// [`wait_for_connection`](Self::wait_for_connection) for the outcome.
    pub fn connect_ble(&self, address: &str) -> bool {
        self.disconnect();
        self.inner.set_connect_error(None);
        self.inner.ble_outcome.send_replace(None);
        let (generation, callbacks) = self.begin_attempt(TransportKind::Ble, address);
        self.inner
            .publish_status(ConnectionStatus::connecting(BLE_CONNECTING_MESSAGE));

        let worker = self.clone();
        let worker_address = address.to_owned();
        let worker_callbacks = Arc::clone(&callbacks);
        let spawned = std::thread::Builder::new()
            .name("mesh-ble-connect".into())
            .spawn(move || worker.run_ble_attempt(generation, &worker_address, &worker_callbacks));

        match spawned {
            Ok(_) => true,
            Err(e) => {
                self.fail_ble(generation, &callbacks, &format!("failed to start BLE worker: {e}"));
                false
            }
        }
    }

    /// Connects using a transport kind and a textual address.
    ///
    /// TCP addresses are `host` or `host:port`. BLE connects in the
    /// background as with [`connect_ble`](Self::connect_ble).
    ///
    /// # Errors
    ///
    /// Returns an error only for an unusable kind or address; connection
    /// failures are reported as `Ok(false)`.
    pub fn connect(&self, kind: TransportKind, address: &str) -> Result<bool> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::InvalidAddress {
                reason: "empty address".into(),
            });
        }
        match kind {
            TransportKind::Serial => Ok(self.connect_serial(address)),
            TransportKind::Tcp => {
                let target =
                    TcpAddress::parse_with_default(address, self.inner.config.default_tcp_port)?;
                Ok(self.connect_tcp_address(&target))
            }
            TransportKind::Ble => Ok(self.connect_ble(address)),
            TransportKind::None => Err(Error::InvalidAddress {
                reason: "no transport kind given".into(),
            }),
        }
    }

    /// Closes the current session, if any.
    ///
    /// Idempotent. A pending BLE attempt is abandoned and its result
    /// discarded.
    pub fn disconnect(&self) {
        let (session, callbacks, generation, was_pending) = {
            let mut link = self.inner.link();
            link.generation += 1;
            let was_pending = std::mem::take(&mut link.ble_pending);
            (
                link.session.take(),
                link.callbacks.take(),
                link.generation,
                was_pending,
            )
        };

        if session.is_some() {
            tracing::info!("disconnecting from device");
        }
        release(session, callbacks);
        self.inner.directory.clear();

        {
            let mut link = self.inner.link();
            if link.generation == generation {
                link.state = ConnectionState::disconnected();
            }
        }
        if was_pending {
            self.inner.ble_outcome.send_replace(Some(false));
        }
    }

    /// Waits for a pending BLE attempt to finish.
    ///
    /// Without a pending attempt, returns whether a session is open now.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let mut outcome = self.inner.ble_outcome.subscribe();
        let (pending, connected) = {
            let link = self.inner.link();
            (link.ble_pending, link.state.is_connected())
        };
        if !pending {
            return connected;
        }

        let waited = tokio::time::timeout(timeout, outcome.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(result)) => (*result).unwrap_or(false),
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!("BLE connection still pending after {timeout:?}");
                false
            }
        }
    }

    /// Scans for BLE devices and replaces the discovery cache.
    ///
    /// Returns an empty list if the scan fails.
    pub fn scan_ble(&self) -> Vec<BleScanResult> {
        let duration = self.inner.config.ble_scan();
        tracing::info!("scanning for BLE devices ({}s)", duration.as_secs());

        match self.inner.connector.scan_ble(duration) {
            Ok(devices) => {
                self.inner.discovery.replace(&devices);
                tracing::info!("found {} BLE devices", devices.len());
                devices.iter().map(BleScanResult::from).collect()
            }
            Err(e) => {
                tracing::error!("BLE scan error: {e}");
                Vec::new()
            }
        }
    }

    /// Disconnects and cancels every pending store write.
    pub fn shutdown(&self) {
        self.disconnect();
        self.inner.bridge.cancel_all();
        tracing::debug!("bridge shut down");
    }

    // ==================== State queries ====================

    /// Snapshot of the connection state.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.inner.link().state.clone()
    }

    /// Returns true if a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.link().state.is_connected()
    }

    /// Error of the most recent failed BLE attempt.
    #[must_use]
    pub fn connect_error(&self) -> Option<String> {
        self.inner
            .connect_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of the local node.
    #[must_use]
    pub fn my_node_num(&self) -> Option<u32> {
        self.current_session()?.my_node_num()
    }

    /// User id of the local node.
    #[must_use]
    pub fn my_node_id(&self) -> Option<String> {
        self.my_node_num().map(|num| NodeId::new(num).to_string())
    }

    /// Channels configured on the local node. Disabled channels are left
    /// out and unnamed ones are labelled by index.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelInfo> {
        let Some(session) = self.current_session() else {
            return Vec::new();
        };
        session
            .channels()
            .into_iter()
            .filter(|channel| channel.role != ChannelRole::Disabled)
            .map(|mut channel| {
                if channel.name.is_empty() {
                    channel.name = format!("Channel {}", channel.index);
                }
                channel
            })
            .collect()
    }

    /// Configuration of the local node.
    ///
    /// Holds the `localConfig` and `moduleConfig` blocks the device reported,
    /// with unset fields dropped. Empty when no session is open.
    #[must_use]
    pub fn device_config(&self) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(session) = self.current_session() {
            let device = session.device_config();
            for block in DEVICE_CONFIG_BLOCKS {
                if let Some(value) = device.get(block).and_then(compat::to_plain) {
                    config.insert(block.to_owned(), value);
                }
            }
        }
        Value::Object(config)
    }

    /// Every node in the device's peer table.
    #[must_use]
    pub fn list_nodes(&self) -> Vec<NodeRecord> {
        self.current_session()
            .map(|session| self.inner.directory.list(&session.nodes()))
            .unwrap_or_default()
    }

    /// Looks up a node by user id or decimal node number.
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<NodeRecord> {
        let session = self.current_session()?;
        self.inner.directory.find(&session.nodes(), id)
    }

    /// Subscribes to notifications.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.inner.sink.subscribe()
    }

    /// The notification sink, for filtered waits.
    #[must_use]
    pub fn notifications(&self) -> &NotificationSink {
        &self.inner.sink
    }

    // ==================== Commands ====================

    /// Sends a text message with delivery confirmation requested.
    ///
    /// `destination` defaults to broadcast. The message is stored as pending
    /// before this returns. Returns the packet id, or `None` when not
    /// connected or the session rejects the send.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNodeId`] for a destination that is neither a
    /// node id nor the broadcast address.
    pub async fn send_message(
        &self,
        text: &str,
        destination: Option<&str>,
        channel: u32,
        reply_id: Option<u32>,
    ) -> Result<Option<u32>> {
        if let Some(destination) = destination.filter(|d| *d != BROADCAST_ID) {
            destination.parse::<NodeId>()?;
        }
        let Some(session) = self.connected_session() else {
            tracing::warn!("cannot send message: not connected");
            return Ok(None);
        };

        let request = TextRequest {
            text: text.to_owned(),
            destination: destination.unwrap_or(BROADCAST_ID).to_owned(),
            want_ack: true,
            channel,
            reply_id,
        };
        let packet_id = match session.send_text(&request) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("send error: {e}");
                return Ok(None);
            }
        };
        tracing::debug!("sent packet {packet_id} to {}", request.destination);

        let record = NewMessage {
            packet_id: Some(packet_id),
            sender: session
                .my_node_num()
                .map_or_else(|| LOCAL_SENDER.to_owned(), |num| NodeId::new(num).to_string()),
            receiver: destination
                .filter(|d| *d != BROADCAST_ID)
                .map(str::to_owned),
            channel,
            text: text.to_owned(),
            is_outgoing: true,
            ack_status: AckStatus::Pending,
            reply_id,
        };
        if let Err(e) = self.inner.store.append(record).await {
            tracing::error!("failed to store outgoing message {packet_id}: {e}");
        }
        Ok(Some(packet_id))
    }

    /// Sends a route discovery request. The response arrives as a
    /// traceroute notification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNodeId`] for a malformed destination.
    pub fn send_traceroute(
        &self,
        destination: &str,
        hop_limit: Option<u32>,
        channel: u32,
    ) -> Result<bool> {
        destination.parse::<NodeId>()?;
        let Some(session) = self.connected_session() else {
            tracing::warn!("cannot send traceroute: not connected");
            return Ok(false);
        };

        let request = DataRequest {
            payload: Bytes::new(),
            destination: destination.to_owned(),
            port: PortType::Traceroute,
            channel,
            hop_limit: hop_limit
                .unwrap_or(self.inner.config.default_hop_limit)
                .min(MAX_HOP_LIMIT),
            want_response: true,
        };
        match session.send_data(&request) {
            Ok(()) => {
                tracing::info!("traceroute sent to {destination}");
                Ok(true)
            }
            Err(e) => {
                tracing::error!("traceroute error: {e}");
                Ok(false)
            }
        }
    }

    /// Sets or clears a node's favorite flag on the device.
    ///
    /// The directory reflects the change immediately if the node is in the
    /// peer table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNodeId`] for a malformed node id.
    pub fn set_favorite(&self, node_id: &str, favorite: bool) -> Result<bool> {
        node_id.parse::<NodeId>()?;
        let Some(session) = self.connected_session() else {
            tracing::warn!("cannot set favorite: not connected");
            return Ok(false);
        };

        if let Err(e) = session.set_favorite(node_id, favorite) {
            tracing::error!("set favorite error: {e}");
            return Ok(false);
        }
        if !self
            .inner
            .directory
            .set_favorite(&session.nodes(), node_id, favorite)
        {
            tracing::debug!("{node_id} not in peer table, no local override");
        }
        tracing::info!(
            "{} favorite: {node_id}",
            if favorite { "set" } else { "cleared" }
        );
        Ok(true)
    }

    /// Reads message history, newest `limit` matches oldest first.
    ///
    /// `limit` defaults to [`DEFAULT_QUERY_LIMIT`].
    pub async fn messages(
        &self,
        filter: MessageFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        self.inner
            .store
            .query(filter, limit.unwrap_or(DEFAULT_QUERY_LIMIT))
            .await
    }

    /// Reads the direct-message exchange with `partner`.
    ///
    /// `partner` may be given with or without the leading `!`. Narrowed to
    /// the local node when it is known.
    pub async fn conversation(&self, partner: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let filter = MessageFilter::Direct {
            partner: canonical_node_id(partner),
            local: self.my_node_id(),
        };
        self.messages(filter, limit).await
    }

    // ==================== Internals ====================

    fn current_session(&self) -> Option<Arc<dyn Session>> {
        self.inner.link().session.clone()
    }

    fn connected_session(&self) -> Option<Arc<dyn Session>> {
        let link = self.inner.link();
        if link.state.is_connected() {
            link.session.clone()
        } else {
            None
        }
    }

    /// Starts a new generation and registers its callbacks. Leftovers from a
    /// racing connect are released.
    fn begin_attempt(&self, kind: TransportKind, address: &str) -> (u64, Arc<Callbacks>) {
        let (generation, callbacks, leftover_session, leftover_callbacks) = {
            let mut link = self.inner.link();
            link.generation += 1;
            let callbacks = Arc::new(Callbacks {
                owner: Arc::downgrade(&self.inner),
                generation: link.generation,
                active: AtomicBool::new(true),
            });
            let leftover_session = link.session.take();
            let leftover_callbacks = link.callbacks.replace(Arc::clone(&callbacks));
            link.state = ConnectionState::active(Phase::Connecting, kind, address);
            link.ble_pending = kind == TransportKind::Ble;
            (link.generation, callbacks, leftover_session, leftover_callbacks)
        };
        release(leftover_session, leftover_callbacks);
        (generation, callbacks)
    }

    fn connect_with<F>(&self, kind: TransportKind, address: &str, open: F) -> bool
    where
        F: FnOnce(&dyn Connector, Arc<dyn Listener>) -> Result<Box<dyn Session>>,
    {
        self.disconnect();
        let (generation, callbacks) = self.begin_attempt(kind, address);
        tracing::info!("connecting via {kind}: {address}");

        let listener: Arc<dyn Listener> = Arc::clone(&callbacks) as Arc<dyn Listener>;
        match open(self.inner.connector.as_ref(), listener) {
            Ok(session) => self.install(generation, Arc::from(session), kind, address),
            Err(e) => {
                tracing::error!("{kind} connection error: {e}");
                self.abandon(generation, &callbacks, &e.to_string());
                false
            }
        }
    }

    /// Makes an opened session current, unless its attempt was superseded.
    fn install(
        &self,
        generation: u64,
        session: Arc<dyn Session>,
        kind: TransportKind,
        address: &str,
    ) -> bool {
        {
            let mut link = self.inner.link();
            if link.generation == generation {
                link.session = Some(session);
                link.state = ConnectionState::active(Phase::Connected, kind, address);
                drop(link);
                tracing::info!("connected via {kind}: {address}");
                return true;
            }
        }
        tracing::info!("discarding superseded {kind} session to {address}");
        release(Some(session), None);
        false
    }

    /// Records a failed attempt. Returns false if it was already superseded.
    fn abandon(&self, generation: u64, callbacks: &Callbacks, error: &str) -> bool {
        callbacks.unregister();
        let mut link = self.inner.link();
        if link.generation != generation {
            return false;
        }
        link.callbacks = None;
        link.state = ConnectionState::failed(error);
        true
    }

    fn run_ble_attempt(&self, generation: u64, address: &str, callbacks: &Arc<Callbacks>) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.open_ble(address, callbacks)))
            .unwrap_or_else(|panic| {
                Err(Error::transport(format!(
                    "BLE worker panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match outcome {
            Ok(session) => {
                if self.install(generation, session, TransportKind::Ble, address) {
                    self.inner.publish_status(ConnectionStatus::connected(
                        Some(TransportKind::Ble),
                        Some(address.to_owned()),
                    ));
                    self.settle_ble(generation, true);
                }
            }
            Err(e) => self.fail_ble(generation, callbacks, &e.to_string()),
        }
    }

    fn open_ble(&self, address: &str, callbacks: &Arc<Callbacks>) -> Result<Arc<dyn Session>> {
        let config = &self.inner.config;
        let cached = self.inner.discovery.get(address);
        if cached.is_some() {
            tracing::info!("BLE connecting to {address} using cached scan result");
        } else {
            tracing::info!("BLE connecting to {address} (no cached scan result, scanning)");
        }

        let target = BleTarget {
            address: address.to_owned(),
            cached,
            timeout: config.ble_open_timeout(),
        };
        let listener: Arc<dyn Listener> = Arc::clone(callbacks) as Arc<dyn Listener>;
        let session: Arc<dyn Session> = Arc::from(self.inner.connector.open_ble(&target, listener)?);

        if let Err(e) = session.wait_for_connected(config.ble_connected_timeout()) {
            callbacks.unregister();
            release(Some(session), None);
            return Err(Error::transport(format!("BLE link did not come up: {e}")));
        }
        if let Err(e) = session.wait_for_config(config.ble_config_timeout()) {
            tracing::warn!("BLE config download incomplete, continuing: {e}");
        }
        Ok(session)
    }

    fn fail_ble(&self, generation: u64, callbacks: &Callbacks, error: &str) {
        if !self.abandon(generation, callbacks, error) {
            tracing::debug!("superseded BLE attempt failed: {error}");
            return;
        }
        tracing::error!("BLE connection error: {error}");
        self.inner.set_connect_error(Some(error.to_owned()));
        self.inner.publish_status(ConnectionStatus::failed(error));
        self.settle_ble(generation, false);
    }

    /// Ends the pending BLE attempt once its notifications are out.
    fn settle_ble(&self, generation: u64, connected: bool) {
        {
            let mut link = self.inner.link();
            if link.generation == generation {
                link.ble_pending = false;
            }
        }
        self.inner.ble_outcome.send_replace(Some(connected));
    }

    fn on_established(&self) {
        let (kind, address) = {
            let link = self.inner.link();
            (link.state.transport_kind, link.state.address.clone())
        };
        tracing::info!("device connection established");
        let kind = (kind != TransportKind::None).then_some(kind);
        self.inner
            .publish_status(ConnectionStatus::connected(kind, address));
    }

    /// Tears down a dropped session. TCP links get exactly one reconnect.
    fn on_link_lost(&self, generation: u64) {
        let (kind, address, session, callbacks) = {
            let mut link = self.inner.link();
            if link.generation != generation || link.session.is_none() {
                return;
            }
            link.generation += 1;
            link.ble_pending = false;
            link.state.phase = Phase::Reconnecting;
            (
                link.state.transport_kind,
                link.state.address.clone(),
                link.session.take(),
                link.callbacks.take(),
            )
        };
        let generation = generation + 1;

        tracing::warn!(
            "connection lost ({kind} {})",
            address.as_deref().unwrap_or("-")
        );
        self.inner.publish_status(ConnectionStatus::reconnecting());
        release(session, callbacks);
        self.inner.directory.clear();

        if kind == TransportKind::Tcp {
            let target = address.as_deref().and_then(|a| {
                TcpAddress::parse_with_default(a, self.inner.config.default_tcp_port).ok()
            });
            if let Some(target) = target {
                tracing::info!("reconnecting to {target}");
                if !self.connect_tcp_address(&target) {
                    tracing::warn!("reconnect to {target} failed");
                }
                return;
            }
        }

        let mut link = self.inner.link();
        if link.generation == generation {
            link.state = ConnectionState::failed(CONNECTION_LOST);
        }
    }
}

/// Unregisters callbacks, then closes the session.
fn release(session: Option<Arc<dyn Session>>, callbacks: Option<Arc<Callbacks>>) {
    if let Some(callbacks) = callbacks {
        callbacks.unregister();
    }
    if let Some(session) = session {
        if let Err(e) = session.close() {
            tracing::debug!("error closing session: {e}");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

/// Session listener for one connect attempt.
///
/// Delivers nothing once unregistered or once the controller is dropped.
struct Callbacks {
    owner: Weak<Inner>,
    generation: u64,
    active: AtomicBool,
}

impl Callbacks {
    fn unregister(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Runs a handler, turning a panic into a logged failure notification.
    fn deliver(&self, event: &'static str, handler: impl FnOnce(&MeshBridge)) {
        if !self.active.load(Ordering::SeqCst) {
            tracing::trace!("dropping {event} from unregistered session");
            return;
        }
        let Some(inner) = self.owner.upgrade() else {
            return;
        };
        let bridge = MeshBridge { inner };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(&bridge))) {
            let reason = panic_message(panic.as_ref());
            tracing::error!("{event} handler panicked: {reason}");
            bridge.inner.publish_status(ConnectionStatus::failed(reason));
        }
    }
}

impl Listener for Callbacks {
    fn on_receive(&self, packet: Value) {
        self.deliver("receive", |bridge| {
            bridge.inner.dispatcher.dispatch_packet(&packet);
        });
    }

    fn on_connection_established(&self) {
        self.deliver("connection established", MeshBridge::on_established);
    }

    fn on_connection_lost(&self) {
        let generation = self.generation;
        self.deliver("connection lost", |bridge| bridge.on_link_lost(generation));
    }

    fn on_node_updated(&self, node: Value) {
        self.deliver("node update", |bridge| {
            bridge.inner.dispatcher.dispatch_node(&node);
        });
    }
}
