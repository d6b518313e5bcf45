//! Field-name and value-shape compatibility shims.
//!
//! Decoded packets and peer table entries come from several firmware and
//! library generations that spell the same logical field differently. Every
//! accepted spelling lives here, tried in the listed order.

use serde_json::{Map, Value};

/// Spellings of the reply-to packet id.
pub const REPLY_ID_KEYS: &[&str] = &["replyId", "reply_id", "replyTo"];

/// Spellings of the node favorite flag.
pub const FAVORITE_KEYS: &[&str] = &["isFavorite", "is_favorite"];

/// Returns the value of the first key in `keys` that is present in `map`.
#[must_use]
pub fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

/// Extracts the reply-to id, looking in `decoded` before `packet`.
///
/// Zero means "not a reply" on the wire and is skipped.
#[must_use]
pub fn reply_id(decoded: &Map<String, Value>, packet: &Map<String, Value>) -> Option<u32> {
    [decoded, packet].into_iter().find_map(|map| {
        REPLY_ID_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(as_u32))
            .find(|&id| id != 0)
    })
}

/// Reads the favorite flag, defaulting to false when no spelling is present.
#[must_use]
pub fn favorite(node: &Map<String, Value>) -> bool {
    first_present(node, FAVORITE_KEYS).is_some_and(truthy)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// Reads an unsigned 32-bit integer.
#[must_use]
pub fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

/// Reads a signed integer, accepting integral floats.
#[must_use]
pub fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

/// Reads a number as `f64`.
#[must_use]
pub fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Reads a string.
#[must_use]
pub fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_owned)
}

/// Converts a nested structure into a plain key/value tree.
///
/// Unset members (nulls) are dropped from objects, the way protobuf-to-dict
/// conversion omits unset fields. Returns `None` for a null root.
#[must_use]
pub fn to_plain(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(k, v)| to_plain(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        Value::Array(items) => Some(Value::Array(
            items.iter().map(|v| to_plain(v).unwrap_or(Value::Null)).collect(),
        )),
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_reply_id_prefers_decoded() {
        let decoded = obj(json!({"reply_id": 11}));
        let packet = obj(json!({"replyId": 22}));
        assert_eq!(reply_id(&decoded, &packet), Some(11));
    }

    #[test]
    fn test_reply_id_falls_back_to_packet() {
        let decoded = obj(json!({"text": "hi"}));
        let packet = obj(json!({"replyTo": 22}));
        assert_eq!(reply_id(&decoded, &packet), Some(22));
    }

    #[test]
    fn test_reply_id_priority_and_zero() {
        let decoded = obj(json!({"replyId": 0, "replyTo": 5}));
        assert_eq!(reply_id(&decoded, &Map::new()), Some(5));
        assert_eq!(reply_id(&Map::new(), &Map::new()), None);
    }

    #[test]
    fn test_favorite_spellings() {
        assert!(favorite(&obj(json!({"isFavorite": true}))));
        assert!(favorite(&obj(json!({"is_favorite": true}))));
        assert!(!favorite(&obj(json!({"isFavorite": false, "is_favorite": true}))));
        assert!(!favorite(&obj(json!({"num": 1}))));
    }

    #[test]
    fn test_to_plain_drops_nulls() {
        let value = json!({"a": 1, "b": null, "c": {"d": null, "e": [1, {"f": null}]}});
        assert_eq!(
            to_plain(&value),
            Some(json!({"a": 1, "c": {"e": [1, {}]}}))
        );
        assert_eq!(to_plain(&Value::Null), None);
    }

    #[test]
    fn test_numeric_readers() {
        assert_eq!(as_u32(&json!(4_294_967_295_u64)), Some(u32::MAX));
        assert_eq!(as_u32(&json!(4_294_967_296_u64)), None);
        assert_eq!(as_u32(&json!(-1)), None);
        assert_eq!(as_i64(&json!(1_700_000_000.0)), Some(1_700_000_000));
        assert_eq!(as_i64(&json!(1.5)), None);
    }
}
