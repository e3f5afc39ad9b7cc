//! Canonical JSON and SHA-256 digests.
//!
//! Artifacts are sealed with a digest of their canonical form: object keys
//! sorted, integer-valued floats written as integers, compact output. The
//! same payload therefore hashes identically no matter how it was pretty
//! printed or which field order the writer used.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::error::{DelayError, Result};

fn canonicalize(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(v)?);
                }
            }
            Ok(serde_json::Value::Object(sorted))
        }
        serde_json::Value::Array(items) => items
            .iter()
            .map(canonicalize)
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
        serde_json::Value::Number(n) if !(n.is_i64() || n.is_u64()) => {
            let Some(f) = n.as_f64() else {
                return Ok(value.clone());
            };
            if !f.is_finite() {
                return Err(DelayError::NonFinite);
            }
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(serde_json::Value::Number((f as i64).into()))
            } else {
                Ok(value.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

/// Canonical compact JSON for `value`.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    Ok(serde_json::to_string(&canonicalize(value)?)?)
}

/// SHA-256 hex digest of the canonical JSON of `value`.
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    Ok(digest_bytes(canonical_json(value)?.as_bytes()))
}

/// SHA-256 hex digest of raw bytes.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Fingerprint a dataset file so training metadata records exactly what was read.
pub fn digest_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(digest_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_does_not_change_digest() {
        let a = serde_json::json!({ "line": "L1", "bins": [3, 1], "meta": { "z": 1, "a": 2 } });
        let b = serde_json::json!({ "meta": { "a": 2, "z": 1 }, "bins": [3, 1], "line": "L1" });
        assert_eq!(compute_digest(&a).unwrap(), compute_digest(&b).unwrap());
    }

    #[test]
    fn array_order_is_significant() {
        let a = serde_json::json!({ "bins": [1, 3] });
        let b = serde_json::json!({ "bins": [3, 1] });
        assert_ne!(compute_digest(&a).unwrap(), compute_digest(&b).unwrap());
    }

    #[test]
    fn integer_valued_floats_are_written_as_integers() {
        let v = serde_json::json!({ "fill": 12.0, "scale": -0.5 });
        assert_eq!(canonical_json(&v).unwrap(), r#"{"fill":12,"scale":-0.5}"#);
    }

    #[test]
    fn digest_is_lowercase_sha256_hex() {
        let d = digest_bytes(b"runs.csv");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_file_matches_digest_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.csv");
        std::fs::write(&path, b"region,observed_at\n92,2024-01-01 00:00\n").unwrap();
        assert_eq!(
            digest_file(&path).unwrap(),
            digest_bytes(b"region,observed_at\n92,2024-01-01 00:00\n")
        );
    }
}
