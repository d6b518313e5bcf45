//! Connection state and status notifications.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of transport used to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// No transport (disconnected).
    #[default]
    None,
    /// USB/serial line.
    Serial,
    /// TCP socket.
    Tcp,
    /// Bluetooth Low Energy.
    Ble,
}

impl TransportKind {
    /// Returns the lowercase name used in notifications.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Serial => "serial",
            Self::Tcp => "tcp",
            Self::Ble => "ble",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of the device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// No session.
    #[default]
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// A session is open.
    Connected,
    /// The link dropped and the session is being torn down or retried.
    Reconnecting,
}

/// Snapshot of the single device connection.
///
/// `transport_kind` is [`TransportKind::None`] and `address` is `None`
/// exactly when `phase` is [`Phase::Disconnected`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Transport in use.
    pub transport_kind: TransportKind,
    /// Transport address (device path, `host:port` or BLE address).
    pub address: Option<String>,
    /// Current phase.
    pub phase: Phase,
    /// Most recent connect or link error.
    pub last_error: Option<String>,
}

impl ConnectionState {
    /// The terminal disconnected state.
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            transport_kind: TransportKind::None,
            address: None,
            phase: Phase::Disconnected,
            last_error: None,
        }
    }

    /// Disconnected, remembering why.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            last_error: Some(error.into()),
            ..Self::disconnected()
        }
    }

    /// A state in the given non-terminal phase.
    #[must_use]
    pub fn active(phase: Phase, kind: TransportKind, address: impl Into<String>) -> Self {
        Self {
            transport_kind: kind,
            address: Some(address.into()),
            phase,
            last_error: None,
        }
    }

    /// Returns true if a session is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected)
    }
}

/// Payload of a `connection_status` notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connecting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnecting: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransportKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    /// Link is up.
    #[must_use]
    pub fn connected(kind: Option<TransportKind>, address: Option<String>) -> Self {
        Self {
            connected: true,
            kind,
            address,
            ..Self::default()
        }
    }

    /// A connect attempt started.
    #[must_use]
    pub fn connecting(message: impl Into<String>) -> Self {
        Self {
            connecting: Some(true),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Link lost, teardown in progress.
    #[must_use]
    pub fn reconnecting() -> Self {
        Self {
            reconnecting: Some(true),
            ..Self::default()
        }
    }

    /// A connect attempt or callback failed.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connecting: Some(false),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_invariant() {
        let state = ConnectionState::failed("boom");
        assert_eq!(state.phase, Phase::Disconnected);
        assert_eq!(state.transport_kind, TransportKind::None);
        assert!(state.address.is_none());
        assert_eq!(state.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_serialization_skips_absent_fields() {
        let status = ConnectionStatus::connected(Some(TransportKind::Tcp), Some("h:1".into()));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"connected": true, "type": "tcp", "address": "h:1"})
        );

        let json = serde_json::to_value(ConnectionStatus::reconnecting()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"connected": false, "reconnecting": true})
        );
    }
}
