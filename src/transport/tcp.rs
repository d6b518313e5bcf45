//! TCP endpoint addressing.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Port the device's TCP API listens on.
pub const DEFAULT_TCP_PORT: u16 = 4403;

/// A `host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpAddress {
    pub host: String,
    pub port: u16,
}

impl TcpAddress {
    /// Creates an address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port` or `[v6]:port`, using `default_port` when
    /// none is given.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty host or an invalid port.
    pub fn parse_with_default(s: &str, default_port: u16) -> Result<Self, Error> {
        let s = s.trim();
        let invalid = |reason: &str| Error::InvalidAddress {
            reason: format!("{s}: {reason}"),
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid("unexpected text after ']'")),
            }
        } else {
            match s.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                // No port, or a bare IPv6 literal
                _ => (s, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid("invalid port"))?,
            None => default_port,
        };
        if port == 0 {
            return Err(invalid("port 0"));
        }
        Ok(Self::new(host, port))
    }
}

impl FromStr for TcpAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_TCP_PORT)
    }
}

impl fmt::Display for TcpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
