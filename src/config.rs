//! Bridge configuration.
//!
//! Loaded from a TOML file; every key is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! database_path = "/var/lib/meshbridge/messages.db"
//!
//! [connection]
//! default_tcp_port = 4403
//! ble_scan_secs = 10
//! ble_open_timeout_secs = 120
//! ble_connected_timeout_secs = 60
//! ble_config_timeout_secs = 30
//! default_hop_limit = 7
//!
//! [notifications]
//! capacity = 256
//! ```
//!
//! The `MESHBRIDGE_DATABASE_PATH` environment variable overrides
//! `database_path`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};
use crate::transport::DEFAULT_TCP_PORT;

/// Environment variable overriding the database location.
pub const DATABASE_PATH_ENV: &str = "MESHBRIDGE_DATABASE_PATH";

/// Database file name used when nothing else is configured.
pub const DEFAULT_DATABASE_FILE: &str = "meshbridge.db";

/// Highest hop limit the mesh accepts.
pub const MAX_HOP_LIMIT: u32 = 7;

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_ble_scan_secs() -> u64 {
    10
}

fn default_ble_open_timeout_secs() -> u64 {
    120
}

fn default_ble_connected_timeout_secs() -> u64 {
    60
}

fn default_ble_config_timeout_secs() -> u64 {
    30
}

fn default_hop_limit() -> u32 {
    MAX_HOP_LIMIT
}

fn default_capacity() -> usize {
    256
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Message database file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Transport timing and defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port used when a TCP address has none.
    #[serde(default = "default_tcp_port")]
    pub default_tcp_port: u16,
    /// BLE discovery duration.
    #[serde(default = "default_ble_scan_secs")]
    pub ble_scan_secs: u64,
    /// Bound on opening a BLE session (association and handshake).
    #[serde(default = "default_ble_open_timeout_secs")]
    pub ble_open_timeout_secs: u64,
    /// Bound on waiting for a BLE session to report connected.
    #[serde(default = "default_ble_connected_timeout_secs")]
    pub ble_connected_timeout_secs: u64,
    /// Bound on waiting for the device configuration over BLE.
    #[serde(default = "default_ble_config_timeout_secs")]
    pub ble_config_timeout_secs: u64,
    /// Hop limit for traceroutes when the caller gives none.
    #[serde(default = "default_hop_limit")]
    pub default_hop_limit: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_tcp_port: default_tcp_port(),
            ble_scan_secs: default_ble_scan_secs(),
            ble_open_timeout_secs: default_ble_open_timeout_secs(),
            ble_connected_timeout_secs: default_ble_connected_timeout_secs(),
            ble_config_timeout_secs: default_ble_config_timeout_secs(),
            default_hop_limit: default_hop_limit(),
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub const fn ble_scan(&self) -> Duration {
        Duration::from_secs(self.ble_scan_secs)
    }

    #[must_use]
    pub const fn ble_open_timeout(&self) -> Duration {
        Duration::from_secs(self.ble_open_timeout_secs)
    }

    #[must_use]
    pub const fn ble_connected_timeout(&self) -> Duration {
        Duration::from_secs(self.ble_connected_timeout_secs)
    }

    #[must_use]
    pub const fn ble_config_timeout(&self) -> Duration {
        Duration::from_secs(self.ble_config_timeout_secs)
    }
}

/// Notification fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Notifications buffered per subscriber before it starts lagging.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Config {
    /// Loads and validates a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes this configuration as TOML.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidConfig {
            reason: reason.to_owned(),
        };
        let connection = &self.connection;
        if connection.default_tcp_port == 0 {
            return Err(invalid("connection.default_tcp_port must be non-zero"));
        }
        if connection.default_hop_limit == 0 || connection.default_hop_limit > MAX_HOP_LIMIT {
            return Err(invalid("connection.default_hop_limit must be between 1 and 7"));
        }
        if connection.ble_scan_secs == 0 {
            return Err(invalid("connection.ble_scan_secs must be non-zero"));
        }
        if self.notifications.capacity == 0 {
            return Err(invalid("notifications.capacity must be non-zero"));
        }
        Ok(())
    }

    /// Resolves the database file: environment, then configuration, then a
    /// file next to the running executable.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        resolve_database_path(
            std::env::var_os(DATABASE_PATH_ENV),
            self.database_path.as_deref(),
            std::env::current_exe().ok().as_deref(),
        )
    }
}

fn resolve_database_path(
    env: Option<OsString>,
    configured: Option<&Path>,
    exe: Option<&Path>,
) -> PathBuf {
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    exe.and_then(Path::parent).map_or_else(
        || PathBuf::from(DEFAULT_DATABASE_FILE),
        |dir| dir.join(DEFAULT_DATABASE_FILE),
    )
}
