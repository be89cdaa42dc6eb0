//! Canonical JSON serialisation and content hashing (§4.2, §9
//! "Content-hash canonicalisation").
//!
//! `content_hash` must be a pure function of `properties`: identical logical
//! contents produce identical bytes regardless of key order (invariant 4).
//! `serde_json::Value`'s `Object` variant is backed by a `BTreeMap` (this
//! crate does not enable serde_json's `preserve_order` feature), so simply
//! walking the value recursively and re-emitting object keys in the order
//! the map already gives us is sufficient to get sorted keys for free ---
//! but we sort explicitly anyway so this keeps holding even if a future
//! dependency upgrade flips that default.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest.
pub type ContentHash = [u8; 32];

/// Serialises `value` into canonical bytes: object keys sorted
/// lexicographically, numbers in their natural JSON form, strings as UTF-8,
/// arrays left in original order, no insignificant whitespace.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_json_string(key, out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
    }
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    // serde_json's string escaping already produces the minimal, canonical
    // escape sequences we want (no insignificant whitespace is possible
    // inside a JSON string literal either way).
    let escaped = serde_json::to_string(s).expect("string serialisation cannot fail");
    out.extend_from_slice(escaped.as_bytes());
}

/// `content_hash` is computed over the canonical bytes of `properties`.
/// `nil` and `{}` hash identically, since both canonicalise to an empty
/// object.
pub fn content_hash(properties: Option<&Map<String, Value>>) -> ContentHash {
    let value = match properties {
        Some(map) if !map.is_empty() => Value::Object(map.clone()),
        _ => Value::Object(Map::new()),
    };
    let bytes = canonical_bytes(&value);
    let digest = Sha256::digest(&bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Canonical-JSON value equality, used by the change-summary diff (§4.2) and
/// the merge analyser's per-path comparison (§4.5).
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    canonical_bytes(a) == canonical_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"a": 1, "b": {"c": "x", "d": 2}}).as_object().unwrap().clone();
        let b = json!({"b": {"d": 2, "c": "x"}, "a": 1}).as_object().unwrap().clone();
        assert_eq!(content_hash(Some(&a)), content_hash(Some(&b)));
    }

    #[test]
    fn nil_and_empty_object_hash_identically() {
        assert_eq!(content_hash(None), content_hash(Some(&Map::new())));
    }

    #[test]
    fn different_values_hash_differently() {
        let a = json!({"a": 1}).as_object().unwrap().clone();
        let b = json!({"a": 2}).as_object().unwrap().clone();
        assert_ne!(content_hash(Some(&a)), content_hash(Some(&b)));
    }

    #[test]
    fn canonical_eq_ignores_key_order() {
        assert!(canonical_eq(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
        assert!(!canonical_eq(&json!({"a": 1}), &json!({"a": 2})));
    }

    #[test]
    fn array_order_is_significant() {
        assert!(!canonical_eq(&json!([1, 2]), &json!([2, 1])));
    }
}
