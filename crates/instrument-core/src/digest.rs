// ─────────────────────────────────────────────────────────────────────
// Instrumentation Kernel — HashBinder
// ─────────────────────────────────────────────────────────────────────
//! Canonical SHA-256 digests.
//!
//! Every hash in the kernel (integrity hashes, state hashes, key hashes,
//! state ids) is produced here. Structured values are serialized to JSON
//! with object keys sorted recursively, so two logically-equal payloads
//! digest identically regardless of field order.
//!
//! Numbers are canonicalized too: an integral float within ±2^53 is
//! written as an integer (and `-0.0` as `0`), so `1.0` and `1` digest
//! identically, as they would after a round-trip through a JavaScript
//! client.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use instrument_types::{InstrumentError, InstrumentResult};

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Canonical byte encoding of `value`: compact JSON, keys sorted.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> InstrumentResult<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| InstrumentError::internal(format!("canonical encoding failed: {e}")))?;
    let sorted = sort_json(value);
    serde_json::to_vec(&sorted)
        .map_err(|e| InstrumentError::internal(format!("canonical encoding failed: {e}")))
}

fn sort_json(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, val) in entries {
                sorted.insert(k, sort_json(val));
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json).collect()),
        Value::Number(n) => Value::Number(canonical_number(n)),
        other => other,
    }
}

fn canonical_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
            Number::from(f as i64)
        }
        _ => n,
    }
}

/// Digest of the canonical encoding of `value`, lowercase hex.
pub fn digest<T: Serialize + ?Sized>(value: &T) -> InstrumentResult<String> {
    Ok(digest_bytes(&canonical_bytes(value)?))
}

/// Digest of raw bytes, lowercase hex.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(data);
    hex::encode(h.finalize())
}

/// True if `candidate` has the exact shape of a digest from this module.
pub fn is_well_formed(candidate: &str) -> bool {
    candidate.len() == DIGEST_HEX_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_independent() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn test_nested_key_order_independent() {
        let a = json!({"outer": {"z": [1, {"y": 2, "x": 3}], "a": null}});
        let b = json!({"outer": {"a": null, "z": [1, {"x": 3, "y": 2}]}});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            digest(&json!([1, 2])).unwrap(),
            digest(&json!([2, 1])).unwrap()
        );
    }

    #[test]
    fn test_canonical_is_compact_and_sorted() {
        let bytes = canonical_bytes(&json!({"b": 2, "a": {"d": 1, "c": 0}})).unwrap();
        assert_eq!(bytes, br#"{"a":{"c":0,"d":1},"b":2}"#.to_vec());
    }

    #[test]
    fn test_integral_floats_digest_as_integers() {
        assert_eq!(
            digest(&json!({"a": 1.0})).unwrap(),
            digest(&json!({"a": 1})).unwrap()
        );
        assert_eq!(
            canonical_bytes(&json!([0.0, -0.0, 2.0, -3.0, 0.5])).unwrap(),
            br#"[0,0,2,-3,0.5]"#.to_vec()
        );
        assert_ne!(
            digest(&json!({"a": 1.5})).unwrap(),
            digest(&json!({"a": 1})).unwrap()
        );
    }

    #[test]
    fn test_large_floats_keep_float_form() {
        let bytes = canonical_bytes(&json!([1e300])).unwrap();
        assert_eq!(bytes, serde_json::to_vec(&json!([1e300])).unwrap());
    }

    #[test]
    fn test_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_string_digest_hashes_json_encoding() {
        // A string value hashes as its JSON spelling, quotes included.
        assert_eq!(digest("abc").unwrap(), digest_bytes(br#""abc""#));
    }

    #[test]
    fn test_digest_shape() {
        let d = digest(&json!({"k": "v"})).unwrap();
        assert_eq!(d.len(), DIGEST_HEX_LEN);
        assert!(is_well_formed(&d));
    }

    #[test]
    fn test_well_formed_rejects_uppercase_and_length() {
        let d = digest_bytes(b"x");
        assert!(!is_well_formed(&d.to_uppercase()));
        assert!(!is_well_formed(&d[..63]));
        assert!(!is_well_formed(&format!("{d}0")));
        assert!(!is_well_formed(&d.replacen(&d[..1], "g", 1)));
    }
}
