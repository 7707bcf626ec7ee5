//! In-memory storage
//!
//! Process-local documents for tests and the console demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{check_etag, stamp_etag, Storage, StorageError, StoreItems};

pub struct MemoryStorage {
    documents: RwLock<HashMap<String, serde_json::Value>>,
    etag: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            etag: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        let documents = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|key| documents.get(key).map(|doc| (key.clone(), doc.clone())))
            .collect())
    }

    async fn write(&self, changes: StoreItems) -> Result<(), StorageError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Validate everything first so a conflict or a malformed document
        // writes nothing
        for (key, document) in &changes {
            check_etag(key, document, documents.get(key))?;
        }
        for (key, document) in changes {
            let etag = self.etag.fetch_add(1, Ordering::SeqCst) + 1;
            let document = stamp_etag(&key, document, etag.to_string())?;
            documents.insert(key, document);
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            documents.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(key: &str, value: serde_json::Value) -> StoreItems {
        let mut items = StoreItems::new();
        items.insert(key.to_string(), value);
        items
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let storage = MemoryStorage::new();
        storage
            .write(items("a", json!({"count": 1})))
            .await
            .unwrap();

        let read = storage
            .read(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read["a"]["count"], json!(1));
        assert!(read["a"]["eTag"].is_string());

        storage.delete(&["a".to_string()]).await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_stale_etag_rejected() {
        let storage = MemoryStorage::new();
        storage.write(items("a", json!({"v": 1}))).await.unwrap();
        let first = storage.read(&["a".to_string()]).await.unwrap()["a"].clone();

        // Writing with the current tag succeeds and moves the tag on
        storage.write(items("a", first.clone())).await.unwrap();

        let err = storage.write(items("a", first)).await.unwrap_err();
        assert!(matches!(err, StorageError::Concurrency { .. }));

        storage
            .write(items("a", json!({"eTag": "*", "v": 3})))
            .await
            .unwrap();
        let read = storage.read(&["a".to_string()]).await.unwrap();
        assert_eq!(read["a"]["v"], json!(3));
    }

    #[tokio::test]
    async fn test_malformed_document_writes_nothing() {
        let storage = MemoryStorage::new();
        let mut changes = items("a", json!({"v": 1}));
        changes.insert("b".to_string(), json!(5));

        let err = storage.write(changes).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument(key) if key == "b"));
        assert!(storage.is_empty());
    }
}
