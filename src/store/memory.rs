//! In-process message store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;

use crate::error::Result;
use crate::store::{MessageFilter, MessageStore, unix_now};
use crate::types::{AckStatus, Message, NewMessage};

#[derive(Default)]
struct Inner {
    messages: Vec<Message>,
    settings: HashMap<String, String>,
    next_id: i64,
}

/// Message store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored message, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, message: NewMessage) -> BoxFuture<'_, Result<i64>> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.messages.push(Message::from_new(id, unix_now(), message));
            Ok(id)
        })
    }

    fn update_ack(&self, packet_id: u32, status: AckStatus) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut inner = self.lock();
            let mut updated = 0;
            for message in inner
                .messages
                .iter_mut()
                .filter(|m| m.packet_id == Some(packet_id))
            {
                message.ack_status = status;
                updated += 1;
            }
            Ok(updated)
        })
    }

    fn query(&self, filter: MessageFilter, limit: usize) -> BoxFuture<'_, Result<Vec<Message>>> {
        Box::pin(async move {
            let inner = self.lock();
            let mut window: Vec<Message> = inner
                .messages
                .iter()
                .rev()
                .filter(|m| filter.matches(m))
                .take(limit)
                .cloned()
                .collect();
            window.reverse();
            Ok(window)
        })
    }

    fn save_setting(&self, key: String, value: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lock().settings.insert(key, value);
            Ok(())
        })
    }

    fn get_setting(&self, key: String) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(self.lock().settings.get(&key).cloned()) })
    }
}
