//! Hashing System - DNA and Report Fingerprints
//!
//! DNA identifies a trait combination independent of layer order.
//! SHA-256 over canonical JSON seals the run report.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};

use crate::layers::Attribute;

pub const DNA_SEPARATOR: &str = "-";

/// Derive the DNA of an attribute list.
///
/// Values are lower-cased with whitespace removed, sorted, then joined.
/// Trait types do not participate.
pub fn derive_dna(attributes: &[Attribute]) -> String {
    let mut values: Vec<String> = attributes
        .iter()
        .map(|a| normalize_value(&a.value))
        .collect();
    values.sort();
    values.join(DNA_SEPARATOR)
}

fn normalize_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(sort_value).collect())
        }
        _ => v.clone()
    }
}

/// Compute manifest hash for a run report
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(manifest)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

// We need hex encoding
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, &str)]) -> Vec<Attribute> {
        pairs.iter().map(|(t, v)| Attribute::new(*t, *v)).collect()
    }

    #[test]
    fn test_dna_normalizes_and_sorts() {
        let a = attrs(&[("Background", "Sky Blue"), ("Body", "Alien"), ("Eyes", "Laser Eyes")]);
        assert_eq!(derive_dna(&a), "alien-lasereyes-skyblue");
    }

    #[test]
    fn test_dna_empty() {
        assert_eq!(derive_dna(&[]), "");
    }

    #[test]
    fn test_dna_ignores_case_and_spacing() {
        let a = attrs(&[("Body", "Big Smile")]);
        let b = attrs(&[("Body", "bigsmile")]);
        assert_eq!(derive_dna(&a), derive_dna(&b));
    }

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_hash_deterministic() {
        let data = b"test data";
        let h1 = sha256_hex(data);
        let h2 = sha256_hex(data);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_manifest_hash_ignores_key_order() {
        let h1 = compute_manifest_hash(&json!({"generated": 3, "backend": "pinata"})).unwrap();
        let h2 = compute_manifest_hash(&json!({"backend": "pinata", "generated": 3})).unwrap();
        assert_eq!(h1, h2);
    }
}
