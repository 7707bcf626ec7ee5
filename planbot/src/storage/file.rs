//! File-based storage
//!
//! One JSON file per key in a directory. Keys are percent-encoded into file
//! names so `msteams/users/29:abc` maps to a single flat file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{check_etag, stamp_etag, Storage, StorageError, StoreItems};

pub struct FileStorage {
    base_path: PathBuf,
    /// Serializes read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create the storage, creating `base_path` if needed
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn document_path(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => {
                    name.push(byte as char)
                }
                _ => name.push_str(&format!("%{:02X}", byte)),
            }
        }
        name.push_str(".json");
        self.base_path.join(name)
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match tokio::fs::read(self.document_path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        let mut items = StoreItems::new();
        for key in keys {
            if let Some(document) = self.load(key).await? {
                items.insert(key.clone(), document);
            }
        }
        Ok(items)
    }

    async fn write(&self, changes: StoreItems) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        for (key, document) in &changes {
            let stored = self.load(key).await?;
            check_etag(key, document, stored.as_ref())?;
        }
        for (key, document) in changes {
            let document = stamp_etag(&key, document, uuid::Uuid::new_v4().to_string())?;
            let bytes = serde_json::to_vec_pretty(&document)?;
            tokio::fs::write(self.document_path(&key), bytes).await?;
            log::debug!("wrote '{}' to {}", key, self.base_path.display());
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        for key in keys {
            match tokio::fs::remove_file(self.document_path(key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
