//! The JSON document model and primary-key material.
//!
//! A document is a plain JSON object. Once accepted by the store it is
//! frozen behind an [`Arc`] and shared by every index that links it, so
//! callers can never mutate a stored record.

use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// A JSON document: a map from field name to JSON value.
///
/// `serde_json::Map` keeps its keys sorted, which makes [`canonical`]
/// deterministic for a given set of fields.
pub type Document = serde_json::Map<String, Value>;

/// A frozen, ref-counted document handle. All indexes share the same
/// allocation, so record identity is pointer identity.
pub type SharedDocument = Arc<Document>;

/// Size of the primary-key probe space: keys are drawn from `[0, 2^31)`.
pub const KEY_SPACE: i64 = 1 << 31;

/// How many slots to probe before giving up on key generation.
pub const KEY_PROBE_BUDGET: i64 = 100_000_000;

/// Convert a JSON value into a document. Anything but an object fails.
pub fn from_value(value: Value) -> Result<Document> {
    Ok(serde_json::from_value(value)?)
}

/// Look up a (possibly dotted) field path in a document.
///
/// `"a.b.c"` walks nested objects; a missing field or a non-object
/// intermediate yields `None`.
pub fn value_at<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// The canonical single-line serialization of a document. Key generation
/// hashes this exact string.
pub fn canonical(doc: &Document) -> Result<String> {
    Ok(serde_json::to_string(doc)?)
}

/// Rolling 32-bit additive string hash: `h = (h << 5) - h + byte`
/// (equivalently `h * 31 + byte`), with wrapping arithmetic.
pub fn string_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for b in s.bytes() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(b));
    }
    h
}

/// The base-36 key for probe slot `(hash + probe) mod 2^31`.
pub fn key_for_slot(hash: i32, probe: i64) -> String {
    let slot = (i64::from(hash) + probe).rem_euclid(KEY_SPACE);
    to_base36(slot as u64)
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Lowercase base-36 rendering of an integer.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // Digits are drawn from an ASCII table.
    String::from_utf8(digits).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_value() {
        assert!(from_value(json!({"a": 1})).is_ok());
        assert!(from_value(json!([1, 2])).is_err());
        assert!(from_value(json!("scalar")).is_err());
    }

    #[test]
    fn test_value_at_top_level() {
        let d = doc(json!({"name": "ada", "age": 36}));
        assert_eq!(value_at(&d, "name"), Some(&json!("ada")));
        assert_eq!(value_at(&d, "age"), Some(&json!(36)));
        assert_eq!(value_at(&d, "missing"), None);
    }

    #[test]
    fn test_value_at_nested() {
        let d = doc(json!({"a": {"b": {"c": 1}}}));
        assert_eq!(value_at(&d, "a.b.c"), Some(&json!(1)));
        assert_eq!(value_at(&d, "a.b"), Some(&json!({"c": 1})));
        assert_eq!(value_at(&d, "a.x.c"), None);
    }

    #[test]
    fn test_value_at_non_object_intermediate() {
        let d = doc(json!({"a": [1, 2, 3]}));
        assert_eq!(value_at(&d, "a.0"), None, "arrays are not traversed");

        let d = doc(json!({"a": "scalar"}));
        assert_eq!(value_at(&d, "a.b"), None);
    }

    #[test]
    fn test_canonical_is_key_ordered() {
        let a = doc(json!({"b": 1, "a": 2}));
        let b = doc(json!({"a": 2, "b": 1}));
        assert_eq!(canonical(&a).unwrap(), canonical(&b).unwrap());
        assert_eq!(canonical(&a).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_string_hash_deterministic() {
        assert_eq!(string_hash("hello"), string_hash("hello"));
        assert_ne!(string_hash("hello"), string_hash("hellp"));
        assert_eq!(string_hash(""), 0);
    }

    #[test]
    fn test_string_hash_wraps() {
        // Long inputs must wrap rather than overflow.
        let long = "x".repeat(10_000);
        let _ = string_hash(&long);
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36 * 36 + 1), "101");
    }

    #[test]
    fn test_key_for_slot_non_negative() {
        // A negative hash must still land inside [0, 2^31).
        let key = key_for_slot(-12345, 0);
        assert!(!key.is_empty());
        let decoded = i64::from_str_radix(&key, 36).unwrap();
        assert!((0..KEY_SPACE).contains(&decoded));
    }

    #[test]
    fn test_key_for_slot_probes_advance() {
        let h = string_hash(r#"{"foo":"bar"}"#);
        assert_ne!(key_for_slot(h, 0), key_for_slot(h, 1));
    }
}
