//! Content hashing
//!
//! Harvest change detection compares SHA-256 hashes of *canonical* JSON:
//! object keys are sorted recursively before serialization, so two payloads
//! that differ only in key order hash identically. Datastore resource
//! versions come from [`compute_file_checksum`] over the file itself.

use crate::error::Result;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Serialize a JSON value with recursively sorted object keys
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex digest of the canonical JSON encoding
pub fn content_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// SHA-256 hex digest of raw bytes
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// MD5 hex digest, used for resource identifiers and table names
pub fn md5_hex(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

/// SHA-256 hex digest of a file, read in chunks
pub async fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [ {"z": 1, "y": 2} ], "c": null}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":null,"d":[{"y":2,"z":1}]},"b":1}"#
        );
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a = json!({"title": "Parks", "keyword": ["a", "b"]});
        let b = json!({"keyword": ["a", "b"], "title": "Parks"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_respects_array_order() {
        let a = json!({"keyword": ["a", "b"]});
        let b = json!({"keyword": ["b", "a"]});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[tokio::test]
    async fn test_file_checksum_matches_in_memory_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let checksum = compute_file_checksum(&path).await.unwrap();
        assert_eq!(checksum, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
        assert_eq!(checksum, sha256_hex(b"hello world"));

        // Larger than one read buffer
        let big = vec![b'x'; 200 * 1024];
        std::fs::write(&path, &big).unwrap();
        assert_eq!(compute_file_checksum(&path).await.unwrap(), sha256_hex(&big));
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex("hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }
}
