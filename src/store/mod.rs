//! Message persistence.
//!
//! The bridge only needs three things from a store: append a message, update
//! the ack status of messages by device packet id, and read back a window of
//! history. [`MemoryStore`] keeps everything in process; [`SqliteStore`]
//! persists to a SQLite file.

pub mod memory;
pub mod sqlite;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{AckStatus, Message, NewMessage};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Default number of messages returned by a history query.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Which messages a history query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageFilter {
    /// Every message.
    #[default]
    All,
    /// Messages on one channel.
    Channel(u32),
    /// Direct messages with `partner` on channel 0.
    ///
    /// With `local` set, only the exchange between the two nodes; without
    /// it, anything `partner` sent or received.
    Direct {
        partner: String,
        local: Option<String>,
    },
}

impl MessageFilter {
    /// Checks if a stored message matches this filter.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::Channel(channel) => message.channel == *channel,
            Self::Direct { partner, local } => {
                if message.channel != 0 {
                    return false;
                }
                let receiver = message.receiver.as_deref();
                match local {
                    Some(local) => {
                        (message.sender == *local && receiver == Some(partner))
                            || (message.sender == *partner && receiver == Some(local))
                    }
                    None => message.sender == *partner || receiver == Some(partner),
                }
            }
        }
    }
}

/// Storage for message history.
pub trait MessageStore: Send + Sync {
    /// Appends a message and returns its store id.
    fn append(&self, message: NewMessage) -> BoxFuture<'_, Result<i64>>;

    /// Sets the ack status of every message with `packet_id`.
    ///
    /// Returns the number of messages updated.
    fn update_ack(&self, packet_id: u32, status: AckStatus) -> BoxFuture<'_, Result<usize>>;

    /// Returns the newest `limit` matching messages, oldest first.
    fn query(&self, filter: MessageFilter, limit: usize) -> BoxFuture<'_, Result<Vec<Message>>>;

    /// Stores a setting.
    fn save_setting(&self, key: String, value: String) -> BoxFuture<'_, Result<()>>;

    /// Reads a setting.
    fn get_setting(&self, key: String) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Gets the current Unix timestamp.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
