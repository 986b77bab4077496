//! Determinism utilities for byte-stable serialization and hashing.
//!
//! Every score that enters a hash or a trace record passes through the same
//! rounding primitive, and every hashed payload is serialized as canonical
//! JSON: sorted object keys, rounded floats, no trailing whitespace. This is
//! what makes decision hashes reproducible across runs and platforms.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Decimal places kept when a score enters a hash or a trace record.
pub const SCORE_DECIMALS: i32 = 6;

/// Round a score to [`SCORE_DECIMALS`] decimal places.
///
/// NaN is converted to 0.0 and infinities are clamped, so the result is
/// always serializable as a JSON number. Negative zero collapses to zero.
///
/// # Example
///
/// ```
/// use disambig_engine::determinism::round6;
///
/// assert!((round6(0.123_456_789) - 0.123_457).abs() < 1e-12);
/// assert_eq!(round6(0.1 + 0.2), 0.3);
/// ```
pub fn round6(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    if value.is_infinite() {
        return if value.is_sign_positive() { f64::MAX } else { f64::MIN };
    }
    let scale = 10f64.powi(SCORE_DECIMALS);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// A canonical JSON value: sorted keys, rounded floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<CanonicalValue>),
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Convert a `serde_json::Value` into canonical form.
    pub fn from_json_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CanonicalValue::Null,
            serde_json::Value::Bool(b) => CanonicalValue::Bool(*b),
            serde_json::Value::Number(n) => CanonicalValue::Number(round6(n.as_f64().unwrap_or(0.0))),
            serde_json::Value::String(s) => CanonicalValue::String(s.clone()),
            serde_json::Value::Array(arr) => {
                CanonicalValue::Array(arr.iter().map(Self::from_json_value).collect())
            }
            serde_json::Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (k, v) in obj {
                    map.insert(k.clone(), Self::from_json_value(v));
                }
                CanonicalValue::Object(map)
            }
        }
    }
}

/// Serialize a value to canonical JSON bytes.
///
/// Field order of the input does not matter: object keys are re-sorted via
/// `BTreeMap` and floats are rounded to [`SCORE_DECIMALS`] places before
/// encoding.
pub fn canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
    let json_value = serde_json::to_value(value).expect("serialization failed");
    let canonical = CanonicalValue::from_json_value(&json_value);
    let mut bytes = serde_json::to_vec(&canonical).expect("canonical serialization failed");
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    bytes
}

/// SHA-256 of the given bytes as a lowercase hex string (64 characters).
pub fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// 12-hex-character fingerprint of a value's canonical JSON form.
///
/// ```
/// use disambig_engine::determinism::fingerprint12;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Payload { score: f64 }
///
/// let a = fingerprint12(&Payload { score: 0.5 });
/// let b = fingerprint12(&Payload { score: 0.5 });
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 12);
/// ```
pub fn fingerprint12<T: Serialize>(value: &T) -> String {
    let mut hash = hash_hex(&canonical_json(value));
    hash.truncate(12);
    hash
}

/// Salted redaction hash: SHA-256 of `"{text}||{salt}"`, full 64-char hex.
///
/// Callers truncate to the prefix length their field requires. Changing the
/// salt changes every hash, which deliberately breaks cross-run linkability.
pub fn salted_hash(text: &str, salt: &str) -> String {
    hash_hex(format!("{text}||{salt}").as_bytes())
}
