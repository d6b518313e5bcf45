//! Serial port discovery.
//!
//! Radios attached over USB show up as ordinary serial ports. The session
//! itself is opened by the [`Connector`](super::Connector); this module only
//! finds candidate device paths.

use serde::{Deserialize, Serialize};
use tokio_serial::{SerialPortInfo, SerialPortType};

use crate::error::{Error, Result};

/// USB vendor ids of the serial bridges and MCUs radios ship with.
const RADIO_USB_VENDORS: &[u16] = &[
    0x10c4, // Silicon Labs CP210x
    0x1a86, // WCH CH340/CH9102
    0x0403, // FTDI
    0x303a, // Espressif native USB
    0x239a, // Adafruit nRF52 bootloader
    0x2886, // Seeed
];

/// A serial port found on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortEntry {
    /// Device path (e.g. "/dev/ttyUSB0" or "COM3").
    pub path: String,
    /// USB vendor id, for USB ports.
    pub vid: Option<u16>,
    /// USB product id, for USB ports.
    pub pid: Option<u16>,
    /// Human-readable description reported by the OS.
    pub description: Option<String>,
}

impl SerialPortEntry {
    /// Returns true if the port is a USB bridge radios commonly use.
    #[must_use]
    pub fn is_likely_radio(&self) -> bool {
        self.vid.is_some_and(|vid| RADIO_USB_VENDORS.contains(&vid))
    }
}

impl From<SerialPortInfo> for SerialPortEntry {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                path: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                description: usb.product.or(usb.manufacturer),
            },
            _ => Self {
                path: info.port_name,
                vid: None,
                pid: None,
                description: None,
            },
        }
    }
}

/// Lists available serial ports, likely radios first.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<SerialPortEntry>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    let mut entries: Vec<SerialPortEntry> = ports.into_iter().map(Into::into).collect();
    entries.sort_by_key(|entry| !entry.is_likely_radio());
    tracing::debug!("found {} serial ports", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_likely_radio() {
        let entry = SerialPortEntry {
            path: "/dev/ttyUSB0".into(),
            vid: Some(0x10c4),
            pid: Some(0xea60),
            description: Some("CP2102 USB to UART".into()),
        };
        assert!(entry.is_likely_radio());

        let other = SerialPortEntry {
            vid: Some(0x046d),
            ..entry
        };
        assert!(!other.is_likely_radio());
    }

    #[test]
    fn test_non_usb_port_entry() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        };
        let entry = SerialPortEntry::from(info);
        assert!(entry.vid.is_none());
        assert!(!entry.is_likely_radio());
    }

    #[test]
    #[ignore = "Requires /sys/class/tty - not available in sandboxed builds"]
    fn test_list_ports() {
        // Just verify it doesn't panic
        let _ = list_ports();
    }
}
