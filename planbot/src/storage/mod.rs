//! Key-value storage for bot state
//!
//! Documents are JSON objects. A document may carry an `eTag`; on write the
//! tag must match the stored document's tag unless it is absent or `*`, and
//! every successful write stamps a fresh tag.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

/// Key -> document
pub type StoreItems = BTreeMap<String, Value>;

/// Name of the concurrency token inside a document
pub const ETAG_FIELD: &str = "eTag";

/// Tag that overwrites whatever is stored
pub const WILDCARD_ETAG: &str = "*";

#[async_trait]
pub trait Storage: Send + Sync {
    /// Read documents; missing keys are absent from the result
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError>;

    /// Write documents, all or nothing per key
    async fn write(&self, changes: StoreItems) -> Result<(), StorageError>;

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("eTag conflict for '{key}': expected {expected}, stored {actual}")]
    Concurrency {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Document for '{0}' is not a JSON object")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that the incoming document is an object whose tag matches the
/// stored document's tag
pub(crate) fn check_etag(
    key: &str,
    incoming: &Value,
    stored: Option<&Value>,
) -> Result<(), StorageError> {
    if !incoming.is_object() {
        return Err(StorageError::InvalidDocument(key.to_string()));
    }
    let expected = match incoming.get(ETAG_FIELD).and_then(Value::as_str) {
        None | Some(WILDCARD_ETAG) => return Ok(()),
        Some(tag) => tag,
    };
    let Some(stored) = stored else {
        return Ok(());
    };
    let actual = stored.get(ETAG_FIELD).and_then(Value::as_str).unwrap_or("");
    if actual != expected {
        return Err(StorageError::Concurrency {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Copy of `document` carrying `etag`
pub(crate) fn stamp_etag(key: &str, document: Value, etag: String) -> Result<Value, StorageError> {
    match document {
        Value::Object(mut map) => {
            map.insert(ETAG_FIELD.to_string(), Value::String(etag));
            Ok(Value::Object(map))
        }
        _ => Err(StorageError::InvalidDocument(key.to_string())),
    }
}
