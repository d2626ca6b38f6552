//! Deterministic canonicalization of JSON values for hashing and signing.
//!
//! Every hash and every signature in this crate is computed over the same
//! canonical form: object keys sorted lexicographically at every depth, no
//! insignificant whitespace, UTF-8 throughout, and the `signature`/`proof`
//! fields elided before the bytes are produced.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{CaError, Result};

/// Fields stripped before canonicalizing a signable payload. A value carries
/// its own signature/proof next to the fields that were signed, so hashing or
/// re-signing must first remove them.
const ELIDED_FIELDS: &[&str] = &["signature", "proof"];

/// Recursively sort object keys and drop elided fields, producing a `Value`
/// whose serialized form is stable regardless of insertion order.
fn canonicalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map
                .iter()
                .filter(|(k, _)| !ELIDED_FIELDS.contains(&k.as_str()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize_value(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_value).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` to its canonical JSON bytes: elided fields dropped,
/// object keys sorted at every depth, no whitespace.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let raw = serde_json::to_value(value)?;
    let canon = canonicalize_value(&raw);
    serde_json::to_vec(&canon).map_err(CaError::from)
}

/// SHA-256 of `canonical_bytes(value)`, hex-encoded.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// SHA-256 of raw bytes, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
