//! Content fingerprints for registered configuration.
//!
//! Implements:
//! - Canonical JSON rendering (sorted keys, no whitespace)
//! - SHA-256 fingerprints over that rendering, hex encoded

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CdmResult;

/// Render JSON with object keys sorted lexicographically and no whitespace.
pub fn canonicalize_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let elements: Vec<String> = items.iter().map(canonicalize_json).collect();
            format!("[{}]", elements.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let pairs: Vec<String> = keys
                .iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        Value::String((*k).clone()),
                        canonicalize_json(&map[k.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
    }
}

/// SHA-256 over the canonical JSON of any serializable value.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> CdmResult<String> {
    let value = serde_json::to_value(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonicalize_json(&value).as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_form_sorts_keys() {
        let value = json!({"z": 1, "a": "hello", "m": [3, 1, 2]});
        assert_eq!(canonicalize_json(&value), r#"{"a":"hello","m":[3,1,2],"z":1}"#);
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = json!({"scale_factor": 100.0, "source_field": "roll"});
        let b = json!({"source_field": "roll", "scale_factor": 100.0});
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert_eq!(fingerprint(&a).unwrap().len(), 64);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = json!({"scale_factor": 100.0});
        let b = json!({"scale_factor": 10.0});
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }
}
