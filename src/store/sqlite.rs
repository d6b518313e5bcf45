//! SQLite-backed message store.
//!
//! Statements run on the blocking pool so store calls never stall the
//! runtime's worker threads.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::error::Result;
use crate::store::{MessageFilter, MessageStore, unix_now};
use crate::types::{AckStatus, Message, NewMessage};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        packet_id INTEGER,
        sender TEXT NOT NULL,
        receiver TEXT,
        channel INTEGER DEFAULT 0,
        text TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        ack_status TEXT DEFAULT 'pending',
        is_outgoing INTEGER DEFAULT 0,
        reply_id INTEGER
    );
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel);
    CREATE INDEX IF NOT EXISTS idx_messages_sender_receiver ON messages(sender, receiver);
    CREATE INDEX IF NOT EXISTS idx_messages_packet_id ON messages(packet_id);
";

const SELECT_COLUMNS: &str = "SELECT id, packet_id, sender, receiver, channel, text, timestamp, \
                              ack_status, is_outgoing, reply_id FROM messages";

/// Message store persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("opening message store: {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        // Databases created before replies were tracked lack the column
        let has_reply_id = conn
            .prepare("SELECT 1 FROM pragma_table_info('messages') WHERE name = 'reply_id'")?
            .exists([])?;
        if !has_reply_id {
            tracing::info!("migrating message store: adding reply_id");
            conn.execute_batch("ALTER TABLE messages ADD COLUMN reply_id INTEGER")?;
        }
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_messages_reply_id ON messages(reply_id)",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await?
    }
}

fn optional_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let ack_status: Option<String> = row.get(7)?;
    Ok(Message {
        id: row.get(0)?,
        packet_id: optional_u32(row.get(1)?),
        sender: row.get(2)?,
        receiver: row.get(3)?,
        channel: u32::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
        text: row.get(5)?,
        timestamp: row.get(6)?,
        ack_status: ack_status
            .as_deref()
            .and_then(AckStatus::parse)
            .unwrap_or(AckStatus::Pending),
        is_outgoing: row.get::<_, i64>(8)? != 0,
        reply_id: optional_u32(row.get(9)?),
    })
}

/// Builds the WHERE clause and parameters for a filter.
fn filter_clause(filter: &MessageFilter) -> (&'static str, Vec<SqlValue>) {
    match filter {
        MessageFilter::All => ("", Vec::new()),
        MessageFilter::Channel(channel) => (
            " WHERE channel = ?",
            vec![SqlValue::Integer(i64::from(*channel))],
        ),
        MessageFilter::Direct {
            partner,
            local: Some(local),
        } => (
            " WHERE channel = 0 AND ((sender = ? AND receiver = ?) OR (sender = ? AND receiver = ?))",
            vec![
                SqlValue::Text(local.clone()),
                SqlValue::Text(partner.clone()),
                SqlValue::Text(partner.clone()),
                SqlValue::Text(local.clone()),
            ],
        ),
        MessageFilter::Direct {
            partner,
            local: None,
        } => (
            " WHERE (sender = ? OR receiver = ?) AND channel = 0",
            vec![
                SqlValue::Text(partner.clone()),
                SqlValue::Text(partner.clone()),
            ],
        ),
    }
}

impl MessageStore for SqliteStore {
    fn append(&self, message: NewMessage) -> BoxFuture<'_, Result<i64>> {
        Box::pin(self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (packet_id, sender, receiver, channel, text, timestamp, \
                 is_outgoing, ack_status, reply_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    message.packet_id,
                    message.sender,
                    message.receiver,
                    message.channel,
                    message.text,
                    unix_now(),
                    message.is_outgoing,
                    message.ack_status.as_str(),
                    message.reply_id,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        }))
    }

    fn update_ack(&self, packet_id: u32, status: AckStatus) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.with_conn(move |conn| {
            Ok(conn.execute(
                "UPDATE messages SET ack_status = ?1 WHERE packet_id = ?2",
                params![status.as_str(), packet_id],
            )?)
        }))
    }

    fn query(&self, filter: MessageFilter, limit: usize) -> BoxFuture<'_, Result<Vec<Message>>> {
        Box::pin(self.with_conn(move |conn| {
            let (clause, mut values) = filter_clause(&filter);
            values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            let sql = format!("{SELECT_COLUMNS}{clause} ORDER BY id DESC LIMIT ?");

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(params_from_iter(values), row_to_message)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.reverse();
            Ok(rows)
        }))
    }

    fn save_setting(&self, key: String, value: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        }))
    }

    fn get_setting(&self, key: String) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(packet_id: Option<u32>, sender: &str, receiver: Option<&str>) -> NewMessage {
        NewMessage {
            packet_id,
            sender: sender.into(),
            receiver: receiver.map(Into::into),
            channel: 0,
            text: format!("from {sender}"),
            is_outgoing: sender == "!me",
            ack_status: if sender == "!me" {
                AckStatus::Pending
            } else {
                AckStatus::Received
            },
            reply_id: Some(3),
        }
    }

    #[tokio::test]
    async fn test_append_and_query_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .append(new_message(Some(4_000_000_000), "!me", Some("!b")))
            .await
            .unwrap();

        let messages = store.query(MessageFilter::All, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.id, id);
        assert_eq!(message.packet_id, Some(4_000_000_000));
        assert_eq!(message.receiver.as_deref(), Some("!b"));
        assert_eq!(message.ack_status, AckStatus::Pending);
        assert!(message.is_outgoing);
        assert_eq!(message.reply_id, Some(3));
    }

    #[tokio::test]
    async fn test_update_ack() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(new_message(Some(9), "!me", None)).await.unwrap();
        assert_eq!(store.update_ack(9, AckStatus::Nak).await.unwrap(), 1);
        let messages = store.query(MessageFilter::All, 10).await.unwrap();
        assert_eq!(messages[0].ack_status, AckStatus::Nak);
    }

    #[tokio::test]
    async fn test_direct_query() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(new_message(Some(1), "!me", Some("!b"))).await.unwrap();
        store.append(new_message(Some(2), "!b", Some("!me"))).await.unwrap();
        store.append(new_message(Some(3), "!b", Some("!c"))).await.unwrap();

        let pair = store
            .query(
                MessageFilter::Direct {
                    partner: "!b".into(),
                    local: Some("!me".into()),
                },
                10,
            )
            .await
            .unwrap();
        let ids: Vec<_> = pair.iter().map(|m| m.packet_id).collect();
        assert_eq!(ids, [Some(1), Some(2)]);

        let any = store
            .query(
                MessageFilter::Direct {
                    partner: "!b".into(),
                    local: None,
                },
                2,
            )
            .await
            .unwrap();
        let ids: Vec<_> = any.iter().map(|m| m.packet_id).collect();
        assert_eq!(ids, [Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append(new_message(Some(5), "!me", None)).await.unwrap();
            store
                .save_setting("last_address".into(), "10.0.0.2:4403".into())
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.query(MessageFilter::All, 10).await.unwrap().len(), 1);
        assert_eq!(
            store.get_setting("last_address".into()).await.unwrap().as_deref(),
            Some("10.0.0.2:4403")
        );
    }
}
