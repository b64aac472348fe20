//! Line codec: one JSON object per journal line.
//!
//! The journal is newline-framed, so an encoded document must never
//! contain a literal newline. serde_json escapes control characters
//! inside strings, which guarantees exactly that.

use jotfile_core::document::{self, Document};
use jotfile_core::Result;
use serde_json::Value;
use std::cmp::Ordering;

/// Encode a document as a single line of UTF-8 (no trailing newline).
pub fn encode(doc: &Document) -> Result<String> {
    let line = document::canonical(doc)?;
    debug_assert!(!line.contains('\n'), "encoded line must be newline-free");
    Ok(line)
}

/// Decode one line back into a document. Anything that is not a JSON
/// object is an error.
pub fn decode(line: &str) -> Result<Document> {
    Ok(serde_json::from_str::<Document>(line)?)
}

/// Total order over JSON values, used for compaction sorting.
///
/// Values order by type rank (null < bool < number < string < array <
/// object), then within the type. Composite values compare by their
/// canonical text.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            let (x, y) = (a.to_string(), b.to_string());
            x.cmp(&y)
        }
        _ => rank(a).cmp(&rank(b)),
    }
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
    fn test_encode_decode_round_trip() {
        let d = doc(json!({
            "_id": 1,
            "name": "ada",
            "nested": {"deep": [1, 2.5, null, true]},
            "when": {"$date": 1_622_548_245_000i64}
        }));
        let line = encode(&d).unwrap();
        assert_eq!(decode(&line).unwrap(), d);
    }

    #[test]
    fn test_encode_is_single_line() {
        let d = doc(json!({"note": "line one\nline two", "tab": "a\tb"}));
        let line = encode(&d).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(decode(&line).unwrap(), d);
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(decode("42").is_err());
        assert!(decode("[1,2]").is_err());
        assert!(decode("not json at all").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_compare_type_ranks() {
        let ordered = [
            json!(null),
            json!(false),
            json!(3),
            json!("a"),
            json!([1]),
            json!({"k": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn test_compare_within_types() {
        assert_eq!(compare(&json!(1), &json!(2.5)), Ordering::Less);
        assert_eq!(compare(&json!("abc"), &json!("abd")), Ordering::Less);
        assert_eq!(compare(&json!(true), &json!(false)), Ordering::Greater);
        assert_eq!(compare(&json!(7), &json!(7.0)), Ordering::Equal);
    }
}
