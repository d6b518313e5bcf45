//! In-memory connector for exercising the controller without a radio.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::{
    BleDevice, BleTarget, Connector, DataRequest, Listener, Session, TcpAddress, TextRequest,
};
use crate::error::{Error, Result};
use crate::types::ChannelInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OpenCall {
    Serial(String),
    Tcp(TcpAddress),
    Ble { address: String, cached: bool },
}

/// Device-side state shared by every session the connector hands out.
#[derive(Default)]
pub(crate) struct MockDevice {
    pub nodes: Mutex<Vec<Value>>,
    pub channels: Mutex<Vec<ChannelInfo>>,
    pub my_node_num: Mutex<Option<u32>>,
    pub texts: Mutex<Vec<TextRequest>>,
    pub data: Mutex<Vec<DataRequest>>,
    pub favorites: Mutex<Vec<(String, bool)>>,
    pub config: Mutex<Value>,
    pub closes: AtomicUsize,
    pub next_packet_id: AtomicU32,
    pub fail_send: AtomicBool,
    pub fail_wait_connected: AtomicBool,
    pub fail_wait_config: AtomicBool,
    /// Fire `on_connection_lost` from inside `close`, as real links do.
    pub lost_on_close: AtomicBool,
}

#[derive(Default)]
pub(crate) struct MockConnector {
    pub device: Arc<MockDevice>,
    pub opens: Mutex<Vec<OpenCall>>,
    pub listeners: Mutex<Vec<Arc<dyn Listener>>>,
    pub fail_open: AtomicBool,
    /// Fire `on_connection_established` before `open_*` returns.
    pub established_on_open: AtomicBool,
    pub ble_delay: Mutex<Duration>,
    pub scan_results: Mutex<Vec<BleDevice>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        let connector = Self::default();
        connector.device.next_packet_id.store(1000, Ordering::SeqCst);
        *connector.device.my_node_num.lock().unwrap() = Some(0x0000_00aa);
        connector.lost_on_close(true);
        Arc::new(connector)
    }

    pub fn lost_on_close(&self, enabled: bool) {
        self.device.lost_on_close.store(enabled, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    pub fn opens(&self) -> Vec<OpenCall> {
        self.opens.lock().unwrap().clone()
    }

    /// Listener handed to the most recent open.
    pub fn listener(&self) -> Arc<dyn Listener> {
        Arc::clone(self.listeners.lock().unwrap().last().unwrap())
    }

    fn open(&self, call: OpenCall, listener: Arc<dyn Listener>) -> Result<Box<dyn Session>> {
        self.opens.lock().unwrap().push(call);
        self.listeners.lock().unwrap().push(Arc::clone(&listener));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::transport("device not found"));
        }
        if self.established_on_open.load(Ordering::SeqCst) {
            listener.on_connection_established();
        }
        Ok(Box::new(MockSession {
            device: Arc::clone(&self.device),
            listener,
        }))
    }
}

impl Connector for MockConnector {
    fn open_serial(&self, path: &str, listener: Arc<dyn Listener>) -> Result<Box<dyn Session>> {
        self.open(OpenCall::Serial(path.to_owned()), listener)
    }

    fn open_tcp(
        &self,
        address: &TcpAddress,
        listener: Arc<dyn Listener>,
    ) -> Result<Box<dyn Session>> {
        self.open(OpenCall::Tcp(address.clone()), listener)
    }

    fn open_ble(
        &self,
        target: &BleTarget,
        listener: Arc<dyn Listener>,
    ) -> Result<Box<dyn Session>> {
        let delay = *self.ble_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.open(
            OpenCall::Ble {
                address: target.address.clone(),
                cached: target.cached.is_some(),
            },
            listener,
        )
    }

    fn scan_ble(&self, _duration: Duration) -> Result<Vec<BleDevice>> {
        Ok(self.scan_results.lock().unwrap().clone())
    }
}

struct MockSession {
    device: Arc<MockDevice>,
    listener: Arc<dyn Listener>,
}

impl Session for MockSession {
    fn close(&self) -> Result<()> {
        self.device.closes.fetch_add(1, Ordering::SeqCst);
        if self.device.lost_on_close.load(Ordering::SeqCst) {
            self.listener.on_connection_lost();
        }
        Ok(())
    }

    fn send_text(&self, request: &TextRequest) -> Result<u32> {
        if self.device.fail_send.load(Ordering::SeqCst) {
            return Err(Error::transport("queue full"));
        }
        self.device.texts.lock().unwrap().push(request.clone());
        Ok(self.device.next_packet_id.fetch_add(1, Ordering::SeqCst))
    }

    fn send_data(&self, request: &DataRequest) -> Result<()> {
        if self.device.fail_send.load(Ordering::SeqCst) {
            return Err(Error::transport("queue full"));
        }
        self.device.data.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn wait_for_connected(&self, timeout: Duration) -> Result<()> {
        if self.device.fail_wait_connected.load(Ordering::SeqCst) {
            return Err(Error::timeout(timeout));
        }
        Ok(())
    }

    fn wait_for_config(&self, timeout: Duration) -> Result<()> {
        if self.device.fail_wait_config.load(Ordering::SeqCst) {
            return Err(Error::timeout(timeout));
        }
        Ok(())
    }

    fn nodes(&self) -> Vec<Value> {
        self.device.nodes.lock().unwrap().clone()
    }

    fn my_node_num(&self) -> Option<u32> {
        *self.device.my_node_num.lock().unwrap()
    }

    fn channels(&self) -> Vec<ChannelInfo> {
        self.device.channels.lock().unwrap().clone()
    }

    fn device_config(&self) -> Value {
        self.device.config.lock().unwrap().clone()
    }

    fn set_favorite(&self, node_id: &str, favorite: bool) -> Result<()> {
        self.device
            .favorites
            .lock()
            .unwrap()
            .push((node_id.to_owned(), favorite));
        Ok(())
    }
}
