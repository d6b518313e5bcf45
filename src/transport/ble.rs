//! BLE discovery results and the discovery cache.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A device found by a BLE scan.
///
/// `handle` is whatever the BLE stack needs to associate without scanning
/// again (for example a platform peripheral id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleDevice {
    pub name: Option<String>,
    pub address: String,
    pub handle: Option<String>,
}

impl BleDevice {
    /// Name to show for this device.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Unknown ({})", self.address))
    }
}

/// Scan result as reported to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleScanResult {
    pub name: String,
    pub address: String,
}

impl From<&BleDevice> for BleScanResult {
    fn from(device: &BleDevice) -> Self {
        Self {
            name: device.display_name(),
            address: device.address.clone(),
        }
    }
}

/// What to connect to over BLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleTarget {
    pub address: String,
    /// Pre-resolved discovery result; when present the session must not scan.
    pub cached: Option<BleDevice>,
    /// Bound on the association handshake.
    pub timeout: Duration,
}

/// Discovery results from the most recent scan, keyed by address.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    devices: Mutex<HashMap<String, BleDevice>>,
}

impl DiscoveryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole cache with a fresh scan.
    pub fn replace(&self, devices: &[BleDevice]) {
        let mut cached = self.lock();
        cached.clear();
        cached.extend(devices.iter().map(|d| (d.address.clone(), d.clone())));
    }

    /// Returns the cached result for an address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<BleDevice> {
        self.lock().get(address).cloned()
    }

    /// Number of cached devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no scan results are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BleDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
