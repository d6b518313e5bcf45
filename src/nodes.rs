//! Node directory cache.
//!
//! The peer table belongs to the device session and can be replaced at any
//! time. The directory reads it on demand, normalizes each entry into a
//! [`NodeRecord`] and layers local favorite overrides on top so a change the
//! user just made shows up before the device reports it back.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::compat;
use crate::types::{NodeRecord, canonical_node_id};

/// Normalizes one peer table entry.
///
/// Missing members stay `None`; the favorite flag defaults to false.
#[must_use]
pub fn normalize_node(entry: &Value) -> NodeRecord {
    let empty = Map::new();
    let map = entry.as_object().unwrap_or(&empty);
    let user = map.get("user").filter(|u| u.is_object());

    NodeRecord {
        id: user
            .and_then(|u| u.get("id"))
            .and_then(compat::as_string),
        num: map.get("num").and_then(compat::as_u32),
        user: user.and_then(compat::to_plain),
        position: map.get("position").and_then(compat::to_plain),
        snr: map.get("snr").and_then(compat::as_f64),
        last_heard: map.get("lastHeard").and_then(compat::as_i64),
        device_metrics: map.get("deviceMetrics").and_then(compat::to_plain),
        is_favorite: compat::favorite(map),
    }
}

/// Normalized, override-aware view over a peer table.
#[derive(Debug, Default)]
pub struct NodeDirectory {
    /// Favorite flags set locally, keyed by user id.
    overrides: Mutex<HashMap<String, bool>>,
}

impl NodeDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes an entry and applies any local favorite override.
    #[must_use]
    pub fn normalize(&self, entry: &Value) -> NodeRecord {
        let mut record = normalize_node(entry);
        if let Some(id) = record.id.as_deref() {
            if let Some(&favorite) = self.lock().get(id) {
                record.is_favorite = favorite;
            }
        }
        record
    }

    /// Lists every entry of the peer table.
    #[must_use]
    pub fn list(&self, entries: &[Value]) -> Vec<NodeRecord> {
        entries.iter().map(|entry| self.normalize(entry)).collect()
    }

    /// Finds a node by user id or decimal node number.
    #[must_use]
    pub fn find(&self, entries: &[Value], id: &str) -> Option<NodeRecord> {
        entries
            .iter()
            .map(|entry| self.normalize(entry))
            .find(|record| record.matches(id))
    }

    /// Records a favorite change for a node present in the peer table.
    ///
    /// `node_id` may be given with or without the leading `!`. Returns false
    /// and records nothing when no entry matches.
    pub fn set_favorite(&self, entries: &[Value], node_id: &str, favorite: bool) -> bool {
        let canonical = canonical_node_id(node_id);
        let found = entries
            .iter()
            .filter_map(|entry| normalize_node(entry).id)
            .find(|id| *id == canonical || id == node_id);

        match found {
            Some(id) => {
                tracing::debug!("favorite override {id} = {favorite}");
                self.lock().insert(id, favorite);
                true
            }
            None => false,
        }
    }

    /// Drops all local overrides.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of local overrides.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn table() -> Vec<Value> {
        vec![
            json!({
                "num": 42,
                "user": {"id": "!0000002a", "longName": "Base", "macaddr": null},
                "position": {"latitude": 52.1, "longitude": 4.3, "altitude": null},
                "snr": 6.25,
                "lastHeard": 1_700_000_000,
                "deviceMetrics": {"batteryLevel": 90},
                "isFavorite": false
            }),
            json!({"num": 7}),
        ]
    }

    #[test]
    fn test_normalize_full_entry() {
        let record = normalize_node(&table()[0]);
        assert_eq!(record.id.as_deref(), Some("!0000002a"));
        assert_eq!(record.num, Some(42));
        assert_eq!(record.user, Some(json!({"id": "!0000002a", "longName": "Base"})));
        assert_eq!(record.position, Some(json!({"latitude": 52.1, "longitude": 4.3})));
        assert_eq!(record.snr, Some(6.25));
        assert_eq!(record.last_heard, Some(1_700_000_000));
        assert!(!record.is_favorite);
    }

    #[test]
    fn test_normalize_bare_entry() {
        let record = normalize_node(&table()[1]);
        assert_eq!(record.id, None);
        assert_eq!(record.num, Some(7));
        assert_eq!(record.user, None);
        assert!(!record.is_favorite);
    }

    #[test]
    fn test_normalize_snake_case_favorite() {
        let record = normalize_node(&json!({"num": 1, "is_favorite": true}));
        assert!(record.is_favorite);
    }

    #[test]
    fn test_find_by_id_or_number() {
        let directory = NodeDirectory::new();
        let nodes = table();
        assert_eq!(directory.find(&nodes, "!0000002a").unwrap().num, Some(42));
        assert_eq!(directory.find(&nodes, "7").unwrap().num, Some(7));
        assert!(directory.find(&nodes, "!ffffffff").is_none());
    }

    #[test]
    fn test_favorite_override_applies_until_cleared() {
        let directory = NodeDirectory::new();
        let nodes = table();

        assert!(directory.set_favorite(&nodes, "0000002a", true));
        assert!(directory.find(&nodes, "!0000002a").unwrap().is_favorite);
        assert!(directory.list(&nodes)[0].is_favorite);

        directory.clear();
        assert!(!directory.find(&nodes, "!0000002a").unwrap().is_favorite);
    }

    #[test]
    fn test_favorite_override_requires_known_node() {
        let directory = NodeDirectory::new();
        assert!(!directory.set_favorite(&table(), "!deadbeef", true));
        assert_eq!(directory.override_count(), 0);
    }
}
