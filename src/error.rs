//! Error types for the meshbridge library.

use thiserror::Error;

/// The main error type for meshbridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport session reported a failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A bounded wait expired.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Node id could not be parsed.
    #[error("invalid node id: {reason}")]
    InvalidNodeId { reason: String },

    /// Transport address could not be parsed.
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },

    /// Message store failure.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized.
    #[error("config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// Configuration value is out of range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// JSON encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No Tokio runtime was available to schedule work on.
    #[error("no async runtime available")]
    NoRuntime,

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Error {
    /// Creates a transport error from anything printable.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Result type alias for meshbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout(std::time::Duration::from_millis(1500));
        assert_eq!(err.to_string(), "timed out after 1500ms");
    }

    #[test]
    fn test_transport_helper() {
        let err = Error::transport("port busy");
        assert!(matches!(err, Error::Transport { ref message } if message == "port busy"));
    }
}
