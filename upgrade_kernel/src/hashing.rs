/// Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 fingerprint of ledger
/// state. Byte-identical across platforms and runs.
///
/// Rules:
///   - kernel_version first, then implementation name and schema version
///   - storage words in ascending slot order, zero words omitted
///   - slots and values as 64-char lowercase hex, no prefix
///   - UTF-8 JSON, no whitespace

use alloy_primitives::U256;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::schema::SchemaDescriptor;
use crate::storage::SlotStorage;
use crate::KERNEL_VERSION;

/// Canonical serialization of (schema identity, storage) to UTF-8 JSON bytes.
pub fn canonical_serialize(schema: &SchemaDescriptor, storage: &SlotStorage) -> Vec<u8> {
    build_canonical_value(schema, storage).to_string().into_bytes()
}

/// SHA-256 of the canonical serialization. Lowercase hex.
pub fn canonical_hash(schema: &SchemaDescriptor, storage: &SlotStorage) -> String {
    hex_digest(&canonical_serialize(schema, storage))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// 64-char lowercase hex of a word.
pub fn word_hex(word: &U256) -> String {
    word.to_be_bytes::<32>()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Field order: kernel_version, implementation, schema_version, storage.
fn build_canonical_value(schema: &SchemaDescriptor, storage: &SlotStorage) -> Value {
    let words: Vec<Value> = storage
        .iter()
        .map(|(slot, value)| Value::Array(vec![Value::String(word_hex(slot)), Value::String(word_hex(value))]))
        .collect();

    let mut root = Map::new();
    root.insert(
        "kernel_version".to_string(),
        Value::Number(u64::from(KERNEL_VERSION).into()),
    );
    root.insert(
        "implementation".to_string(),
        Value::String(schema.name().to_string()),
    );
    root.insert(
        "schema_version".to_string(),
        Value::Number(u64::from(schema.version()).into()),
    );
    root.insert("storage".to_string(), Value::Array(words));
    Value::Object(root)
}
